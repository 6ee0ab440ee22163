use std::io::{Cursor, Write};

use crate::datatypes::{read_bytes, read_tag, read_u16, read_u32, write_u16, write_u32, RawString};
use crate::string_routes::StringRouter;
use crate::utils::EspError;

/// 长度超过 u16 的子记录前置的标记
pub const XXXX_TAG: [u8; 4] = *b"XXXX";

const SUBRECORD_HEADER_SIZE: usize = 6;

/// 子记录的分类
///
/// 只有少数标签需要被解读，其余一律按不透明字节处理并原样写回。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubrecordKind {
    /// TES4 文件头数据
    Hedr,
    /// 编辑器 ID
    Edid,
    /// 主文件名
    Mast,
    /// INFO 的响应数据（含 response id）
    Trdt,
    /// QUST 的目标索引
    Qobj,
    /// PERK 的入口点类型
    Epft,
    /// 可翻译文本
    Text,
    Opaque,
}

impl SubrecordKind {
    pub fn classify(record_type: &str, tag: &[u8; 4], router: &dyn StringRouter) -> Self {
        match (record_type, tag) {
            (_, b"EDID") => SubrecordKind::Edid,
            ("TES4", b"HEDR") => SubrecordKind::Hedr,
            ("TES4", b"MAST") => SubrecordKind::Mast,
            ("INFO", b"TRDT") => SubrecordKind::Trdt,
            ("QUST", b"QOBJ") => SubrecordKind::Qobj,
            ("PERK", b"EPFT") => SubrecordKind::Epft,
            _ => match std::str::from_utf8(tag) {
                Ok(tag) if router.supports_strings(record_type, tag) => SubrecordKind::Text,
                _ => SubrecordKind::Opaque,
            },
        }
    }
}

/// 子记录结构
#[derive(Debug, Clone, PartialEq)]
pub struct Subrecord {
    pub tag: [u8; 4],
    /// 头部声明的长度；扩展子记录的真实长度来自前置的 XXXX
    pub size: u16,
    pub data: Vec<u8>,
    /// 是否由 XXXX 携带真实长度
    pub extended: bool,
    pub kind: SubrecordKind,
    /// 同一记录内区分同类字段的索引
    pub index: Option<i64>,
}

impl Subrecord {
    pub fn new(tag: [u8; 4], data: Vec<u8>, kind: SubrecordKind) -> Self {
        let extended = data.len() > u16::MAX as usize;
        Subrecord {
            tag,
            size: if extended { 0 } else { data.len() as u16 },
            data,
            extended,
            kind,
            index: None,
        }
    }

    /// 解析一个子记录，遇到 XXXX 时连同其后的子记录一起读取
    pub fn parse(cursor: &mut Cursor<&[u8]>, record_type: &str, router: &dyn StringRouter) -> Result<Self, EspError> {
        let tag = read_tag(cursor)?;

        let (tag, size, data, extended) = if tag == XXXX_TAG {
            let marker_size = read_u16(cursor)?;
            if marker_size != 4 {
                return Err(EspError::corrupt(
                    format!("{} XXXX", record_type),
                    format!("XXXX 长度应为 4，实际 {}", marker_size),
                ));
            }
            let real_size = read_u32(cursor)? as usize;
            let tag = read_tag(cursor)?;
            let declared = read_u16(cursor)?;
            (tag, declared, read_bytes(cursor, real_size)?, true)
        } else {
            let size = read_u16(cursor)?;
            (tag, size, read_bytes(cursor, size as usize)?, false)
        };

        Ok(Subrecord {
            tag,
            size,
            data,
            extended,
            kind: SubrecordKind::classify(record_type, &tag, router),
            index: None,
        })
    }

    pub fn write(&self, writer: &mut dyn Write) -> Result<(), EspError> {
        if self.extended || self.data.len() > u16::MAX as usize {
            writer.write_all(&XXXX_TAG)?;
            write_u16(writer, 4)?;
            write_u32(writer, self.data.len() as u32)?;
            writer.write_all(&self.tag)?;
            write_u16(writer, if self.extended { self.size } else { 0 })?;
        } else {
            writer.write_all(&self.tag)?;
            write_u16(writer, self.data.len() as u16)?;
        }
        writer.write_all(&self.data)?;
        Ok(())
    }

    /// 写出后占用的字节数
    pub fn serialized_len(&self) -> usize {
        let header = if self.extended || self.data.len() > u16::MAX as usize {
            SUBRECORD_HEADER_SIZE * 2 + 4
        } else {
            SUBRECORD_HEADER_SIZE
        };
        header + self.data.len()
    }

    /// 替换数据并同步声明长度
    pub fn set_data(&mut self, data: Vec<u8>) {
        if data.len() > u16::MAX as usize {
            self.extended = true;
            self.size = 0;
        } else if !self.extended {
            self.size = data.len() as u16;
        }
        self.data = data;
    }

    pub fn tag_str(&self) -> &str {
        std::str::from_utf8(&self.tag).unwrap_or("????")
    }

    pub fn is_text(&self) -> bool {
        self.kind == SubrecordKind::Text
    }

    /// 作为内嵌文本解码
    pub fn text(&self) -> RawString {
        RawString::parse_zstring(&self.data)
    }

    /// 本地化插件中的字符串表 ID
    pub fn string_id(&self) -> Option<u32> {
        let bytes: [u8; 4] = self.data.get(..4)?.try_into().ok()?;
        Some(u32::from_le_bytes(bytes))
    }
}
