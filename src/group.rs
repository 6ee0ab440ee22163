use std::io::{Cursor, Write};

use crate::datatypes::{peek_tag, read_i32, read_tag, read_u16, read_u32, remaining, write_i32, write_u16, write_u32};
use crate::record::Record;
use crate::string_routes::StringRouter;
use crate::utils::EspError;

/// 组头长度（组大小包含头部）
pub const GROUP_HEADER_SIZE: usize = 24;

/// 组类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupType {
    /// 顶级组，标签为记录类型
    Normal,
    WorldChildren,
    InteriorCellBlock,
    InteriorCellSubBlock,
    ExteriorCellBlock,
    ExteriorCellSubBlock,
    CellChildren,
    TopicChildren,
    CellPersistentChildren,
    CellTemporaryChildren,
    Unknown(i32),
}

impl GroupType {
    pub fn to_i32(&self) -> i32 {
        match self {
            GroupType::Normal => 0,
            GroupType::WorldChildren => 1,
            GroupType::InteriorCellBlock => 2,
            GroupType::InteriorCellSubBlock => 3,
            GroupType::ExteriorCellBlock => 4,
            GroupType::ExteriorCellSubBlock => 5,
            GroupType::CellChildren => 6,
            GroupType::TopicChildren => 7,
            GroupType::CellPersistentChildren => 8,
            GroupType::CellTemporaryChildren => 9,
            GroupType::Unknown(value) => *value,
        }
    }
}

impl From<i32> for GroupType {
    fn from(value: i32) -> Self {
        match value {
            0 => GroupType::Normal,
            1 => GroupType::WorldChildren,
            2 => GroupType::InteriorCellBlock,
            3 => GroupType::InteriorCellSubBlock,
            4 => GroupType::ExteriorCellBlock,
            5 => GroupType::ExteriorCellSubBlock,
            6 => GroupType::CellChildren,
            7 => GroupType::TopicChildren,
            8 => GroupType::CellPersistentChildren,
            9 => GroupType::CellTemporaryChildren,
            _ => GroupType::Unknown(value),
        }
    }
}

/// 组结构
#[derive(Debug, Clone)]
pub struct Group {
    pub label: [u8; 4],
    pub group_type: GroupType,
    pub timestamp: u16,
    pub version_control_info: u16,
    pub unknown: u32,
    pub children: Vec<GroupChild>,
}

/// 组子元素
#[derive(Debug, Clone)]
pub enum GroupChild {
    Group(Box<Group>),
    Record(Record),
}

impl Group {
    /// 解析组，子元素被限制在组声明的长度之内
    pub fn parse(cursor: &mut Cursor<&[u8]>, router: &dyn StringRouter) -> Result<Self, EspError> {
        let start = cursor.position() as usize;
        if remaining(cursor) < GROUP_HEADER_SIZE {
            return Err(EspError::corrupt(format!("GRUP @0x{:X}", start), "组头不完整"));
        }

        let magic = read_tag(cursor)?;
        if &magic != b"GRUP" {
            return Err(EspError::corrupt(
                format!("GRUP @0x{:X}", start),
                format!("期望 GRUP，实际 {}", String::from_utf8_lossy(&magic)),
            ));
        }

        let size = read_u32(cursor)? as usize;
        let label = read_tag(cursor)?;
        let group_type = GroupType::from(read_i32(cursor)?);
        let timestamp = read_u16(cursor)?;
        let version_control_info = read_u16(cursor)?;
        let unknown = read_u32(cursor)?;

        let data: &[u8] = *cursor.get_ref();
        let end = start
            .checked_add(size)
            .filter(|&end| size >= GROUP_HEADER_SIZE && end <= data.len())
            .ok_or_else(|| {
                EspError::corrupt(
                    format!("GRUP {} @0x{:X}", String::from_utf8_lossy(&label), start),
                    format!("组大小 {} 无效（剩余 {} 字节）", size, data.len() - start),
                )
            })?;

        let mut body = Cursor::new(&data[start + GROUP_HEADER_SIZE..end]);
        let mut children = Vec::new();
        while remaining(&body) > 0 {
            if &peek_tag(&mut body)? == b"GRUP" {
                children.push(GroupChild::Group(Box::new(Group::parse(&mut body, router)?)));
            } else {
                children.push(GroupChild::Record(Record::parse(&mut body, router)?));
            }
        }
        cursor.set_position(end as u64);

        Ok(Group {
            label,
            group_type,
            timestamp,
            version_control_info,
            unknown,
            children,
        })
    }

    /// 标签的可读形式：顶级组为记录类型，其余为十六进制
    pub fn label_string(&self) -> String {
        match self.group_type {
            GroupType::Normal => String::from_utf8_lossy(&self.label).into_owned(),
            _ => format!("{:08X}", u32::from_le_bytes(self.label)),
        }
    }

    /// 递归收集所有记录
    pub fn records(&self) -> Vec<&Record> {
        let mut records = Vec::new();
        self.collect_records(&mut records);
        records
    }

    fn collect_records<'a>(&'a self, records: &mut Vec<&'a Record>) {
        for child in &self.children {
            match child {
                GroupChild::Group(group) => group.collect_records(records),
                GroupChild::Record(record) => records.push(record),
            }
        }
    }

    pub fn records_mut(&mut self) -> Vec<&mut Record> {
        let mut records = Vec::new();
        Self::collect_records_mut(self, &mut records);
        records
    }

    fn collect_records_mut<'a>(group: &'a mut Group, records: &mut Vec<&'a mut Record>) {
        for child in &mut group.children {
            match child {
                GroupChild::Group(nested) => Self::collect_records_mut(nested, records),
                GroupChild::Record(record) => records.push(record),
            }
        }
    }

    /// 本组及所有子组的数量
    pub fn count_groups(&self) -> usize {
        1 + self
            .children
            .iter()
            .map(|child| match child {
                GroupChild::Group(group) => group.count_groups(),
                GroupChild::Record(_) => 0,
            })
            .sum::<usize>()
    }

    /// 写出组，大小由子元素重新计算
    pub fn write(&self, writer: &mut dyn Write) -> Result<(), EspError> {
        let mut body = Vec::new();
        for child in &self.children {
            match child {
                GroupChild::Group(group) => group.write(&mut body)?,
                GroupChild::Record(record) => record.write(&mut body)?,
            }
        }

        let size = u32::try_from(GROUP_HEADER_SIZE + body.len())
            .map_err(|_| EspError::corrupt(self.label_string(), "组大小超过 4 GiB"))?;

        writer.write_all(b"GRUP")?;
        write_u32(writer, size)?;
        writer.write_all(&self.label)?;
        write_i32(writer, self.group_type.to_i32())?;
        write_u16(writer, self.timestamp)?;
        write_u16(writer, self.version_control_info)?;
        write_u32(writer, self.unknown)?;
        writer.write_all(&body)?;
        Ok(())
    }
}
