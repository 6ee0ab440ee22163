use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rayon::prelude::*;

use super::Plugin;
use crate::datatypes::{read_tag, read_u32, remaining};
use crate::group::{Group, GROUP_HEADER_SIZE};
use crate::io::{DefaultFileReader, FileReader};
use crate::record::Record;
use crate::string_routes::{DefaultStringRouter, StringRouter};
use crate::subrecord::SubrecordKind;
use crate::utils::EspError;

/// 解析插件文件
pub fn parse_plugin(path: &Path) -> Result<Plugin, EspError> {
    Plugin::parse(path)
}

impl Plugin {
    /// 从磁盘解析插件（内存映射读取）
    ///
    /// # 错误
    /// 文件不存在返回 `FileNotFound`；首记录不是 TES4 或结构越界返回 `CorruptFormat`
    pub fn parse(path: &Path) -> Result<Self, EspError> {
        Self::parse_with_reader(path, &DefaultFileReader)
    }

    /// 使用自定义 Reader 解析插件
    pub fn parse_with_reader(path: &Path, reader: &dyn FileReader) -> Result<Self, EspError> {
        let bytes = reader.read(path)?;
        let router = Arc::new(DefaultStringRouter::from_embedded_data()?);
        let mut plugin = Self::parse_bytes(&bytes, router)?;
        plugin.path = path.to_path_buf();
        tracing::info!(
            "已解析 {}: {} 个顶级组, {} 个主文件",
            plugin.name(),
            plugin.groups.len(),
            plugin.masters.len()
        );
        Ok(plugin)
    }

    /// 从内存解析插件，`name` 用作插件文件名
    pub fn from_bytes(name: &str, data: &[u8]) -> Result<Self, EspError> {
        let router = Arc::new(DefaultStringRouter::from_embedded_data()?);
        Self::with_router(name, data, router)
    }

    /// 使用自定义字符串路由解析
    pub fn with_router(name: &str, data: &[u8], router: Arc<dyn StringRouter>) -> Result<Self, EspError> {
        let mut plugin = Self::parse_bytes(data, router)?;
        plugin.path = PathBuf::from(name);
        Ok(plugin)
    }

    fn parse_bytes(data: &[u8], router: Arc<dyn StringRouter>) -> Result<Self, EspError> {
        let mut cursor = Cursor::new(data);

        let header = Record::parse(&mut cursor, router.as_ref())?;
        Self::validate_header(&header)?;

        let masters = Self::extract_masters(&header);
        let groups = Self::parse_groups(&mut cursor, router.as_ref())?;

        Ok(Plugin {
            path: PathBuf::new(),
            header,
            groups,
            masters,
            router,
        })
    }

    fn validate_header(header: &Record) -> Result<(), EspError> {
        if &header.record_type != b"TES4" {
            return Err(EspError::corrupt(
                "plugin header",
                format!("期望 TES4，实际 {}", header.type_str()),
            ));
        }
        Ok(())
    }

    /// 解析所有顶级组
    ///
    /// 先扫描出每个顶级组的边界，再并行解析各自的字节切片，最后按原顺序收集。
    fn parse_groups(cursor: &mut Cursor<&[u8]>, router: &dyn StringRouter) -> Result<Vec<Group>, EspError> {
        let data: &[u8] = *cursor.get_ref();
        let ranges = Self::scan_group_boundaries(cursor)?;

        ranges
            .par_iter()
            .map(|&(start, end)| {
                let mut group_cursor = Cursor::new(&data[start..end]);
                Group::parse(&mut group_cursor, router).map_err(|e| match e {
                    EspError::CorruptFormat { context, message } => {
                        EspError::corrupt(format!("{} (顶级组 @0x{:X})", context, start), message)
                    }
                    other => other,
                })
            })
            .collect()
    }

    /// 扫描顶级组边界，返回 (起始, 结束) 偏移
    fn scan_group_boundaries(cursor: &mut Cursor<&[u8]>) -> Result<Vec<(usize, usize)>, EspError> {
        let data_len = cursor.get_ref().len();
        let mut boundaries = Vec::new();

        while remaining(cursor) > 0 {
            let start = cursor.position() as usize;
            if remaining(cursor) < GROUP_HEADER_SIZE {
                return Err(EspError::corrupt(
                    format!("@0x{:X}", start),
                    format!("文件末尾有 {} 字节无法构成组头", remaining(cursor)),
                ));
            }

            let tag = read_tag(cursor)?;
            if &tag != b"GRUP" {
                return Err(EspError::corrupt(
                    format!("@0x{:X}", start),
                    format!("期望 GRUP，实际 {}", String::from_utf8_lossy(&tag)),
                ));
            }

            let size = read_u32(cursor)? as usize;
            let end = start + size;
            if size < GROUP_HEADER_SIZE || end > data_len {
                return Err(EspError::corrupt(
                    format!("GRUP @0x{:X}", start),
                    format!("组大小 {} 无效（文件长度 {}）", size, data_len),
                ));
            }

            boundaries.push((start, end));
            cursor.set_position(end as u64);
        }

        Ok(boundaries)
    }

    /// 从头部记录提取主文件列表
    fn extract_masters(header: &Record) -> Vec<String> {
        header
            .subrecords
            .iter()
            .filter(|subrecord| subrecord.kind == SubrecordKind::Mast)
            .map(|subrecord| subrecord.text().content)
            .collect()
    }
}
