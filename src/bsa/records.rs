//! 文件夹记录、文件记录与文件名块

use std::io::{Cursor, Write};

use super::header::{ArchiveHeader, ArchiveVersion};
use crate::datatypes::{
    read_bytes, read_u32, read_u64, read_u8, remaining, write_u32, write_u64, write_u8,
};
use crate::utils::EspError;

/// 文件大小字段中的压缩反转位
pub const COMPRESSION_TOGGLE_BIT: u32 = 0x4000_0000;
/// 文件大小字段的有效位
pub const SIZE_MASK: u32 = 0x3FFF_FFFF;

/// 文件夹记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderRecord {
    pub name_hash: u64,
    pub file_count: u32,
    /// v105 中的填充字段，写回时保留
    pub padding: u32,
    pub offset: u64,
}

impl FolderRecord {
    pub fn parse(cursor: &mut Cursor<&[u8]>, version: ArchiveVersion) -> Result<Self, EspError> {
        let name_hash = read_u64(cursor)?;
        let file_count = read_u32(cursor)?;
        let (padding, offset) = match version {
            ArchiveVersion::SkyrimSe => (read_u32(cursor)?, read_u64(cursor)?),
            _ => (0, u64::from(read_u32(cursor)?)),
        };

        Ok(FolderRecord {
            name_hash,
            file_count,
            padding,
            offset,
        })
    }

    pub fn write(&self, writer: &mut dyn Write, version: ArchiveVersion) -> Result<(), EspError> {
        write_u64(writer, self.name_hash)?;
        write_u32(writer, self.file_count)?;
        match version {
            ArchiveVersion::SkyrimSe => {
                write_u32(writer, self.padding)?;
                write_u64(writer, self.offset)?;
            }
            _ => {
                let offset = u32::try_from(self.offset)
                    .map_err(|_| EspError::corrupt("folder record", "偏移量超出 u32 范围"))?;
                write_u32(writer, offset)?;
            }
        }
        Ok(())
    }
}

/// 文件记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub name_hash: u64,
    /// 原始大小字段（含压缩反转位）
    pub raw_size: u32,
    pub offset: u32,
}

impl FileRecord {
    pub fn parse(cursor: &mut Cursor<&[u8]>) -> Result<Self, EspError> {
        Ok(FileRecord {
            name_hash: read_u64(cursor)?,
            raw_size: read_u32(cursor)?,
            offset: read_u32(cursor)?,
        })
    }

    pub fn write(&self, writer: &mut dyn Write) -> Result<(), EspError> {
        write_u64(writer, self.name_hash)?;
        write_u32(writer, self.raw_size)?;
        write_u32(writer, self.offset)?;
        Ok(())
    }

    /// 数据块大小（去掉标志位）
    pub fn size(&self) -> u32 {
        self.raw_size & SIZE_MASK
    }

    /// 该文件是否压缩：文件自身的反转位与归档全局压缩标志异或
    pub fn is_compressed(&self, archive_compressed: bool) -> bool {
        (self.raw_size & COMPRESSION_TOGGLE_BIT != 0) != archive_compressed
    }
}

/// 每个文件夹对应的文件记录块
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecordBlock {
    /// 文件夹名称（不含结尾 null），未包含目录名时为空
    pub name: String,
    pub files: Vec<FileRecord>,
}

impl FileRecordBlock {
    pub fn parse(
        cursor: &mut Cursor<&[u8]>,
        file_count: u32,
        has_name: bool,
    ) -> Result<Self, EspError> {
        let name = if has_name {
            let length = read_u8(cursor)? as usize;
            let mut bytes = read_bytes(cursor, length)?;
            // 长度包含结尾 null
            if bytes.last() == Some(&0) {
                bytes.pop();
            }
            decode_name(&bytes)
        } else {
            String::new()
        };

        // 声明的数量超过剩余数据时直接判定为损坏
        if (file_count as usize).saturating_mul(16) > remaining(cursor) {
            return Err(EspError::corrupt(
                "file record block",
                format!("文件夹 '{}' 声明 {} 个文件，数据不足", name, file_count),
            ));
        }

        let files = (0..file_count)
            .map(|_| FileRecord::parse(cursor))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(FileRecordBlock { name, files })
    }

    pub fn write(&self, writer: &mut dyn Write, has_name: bool) -> Result<(), EspError> {
        if has_name {
            let bytes = encode_name(&self.name);
            let length = u8::try_from(bytes.len() + 1)
                .map_err(|_| EspError::corrupt("file record block", "文件夹名称过长"))?;
            write_u8(writer, length)?;
            writer.write_all(&bytes)?;
            write_u8(writer, 0)?;
        }
        for file in &self.files {
            file.write(writer)?;
        }
        Ok(())
    }
}

/// 读取文件名块：`count` 个以 null 分隔的名称
pub fn parse_file_name_block(
    cursor: &mut Cursor<&[u8]>,
    header: &ArchiveHeader,
) -> Result<Vec<String>, EspError> {
    let length = header.total_file_name_length as usize;
    let block = read_bytes(cursor, length)
        .map_err(|_| EspError::corrupt("file name block", "文件名块被截断"))?;

    let names: Vec<String> = block
        .split(|&b| b == 0)
        .take(header.file_count as usize)
        .map(decode_name)
        .collect();

    if names.len() < header.file_count as usize {
        return Err(EspError::corrupt(
            "file name block",
            format!("需要 {} 个文件名，只找到 {} 个", header.file_count, names.len()),
        ));
    }

    Ok(names)
}

/// 归档内的名称使用 Windows-1252
pub fn decode_name(bytes: &[u8]) -> String {
    let (decoded, _) = encoding_rs::WINDOWS_1252.decode_without_bom_handling(bytes);
    decoded.into_owned()
}

pub fn encode_name(name: &str) -> Vec<u8> {
    let (encoded, _, _) = encoding_rs::WINDOWS_1252.encode(name);
    encoded.into_owned()
}
