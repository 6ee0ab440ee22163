//! BSA 文件头

use std::io::{Cursor, Write};

use crate::datatypes::{
    decode_flags, read_bytes, read_tag, read_u16, read_u32, write_u16, write_u32,
};
use crate::utils::EspError;

pub const BSA_MAGIC: &[u8; 4] = b"BSA\0";
/// 文件头固定长度，也是 header offset 字段的取值
pub const HEADER_SIZE: u32 = 36;

/// 归档版本
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArchiveVersion {
    /// Oblivion
    Oblivion,
    /// Fallout 3 / New Vegas / Skyrim LE
    Skyrim,
    /// Skyrim Special Edition（LZ4 压缩，64 位文件夹偏移）
    SkyrimSe,
}

impl ArchiveVersion {
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            103 => Some(ArchiveVersion::Oblivion),
            104 => Some(ArchiveVersion::Skyrim),
            105 => Some(ArchiveVersion::SkyrimSe),
            _ => None,
        }
    }

    pub fn as_u32(self) -> u32 {
        match self {
            ArchiveVersion::Oblivion => 103,
            ArchiveVersion::Skyrim => 104,
            ArchiveVersion::SkyrimSe => 105,
        }
    }

    /// 文件夹记录长度
    pub fn folder_record_size(self) -> usize {
        match self {
            ArchiveVersion::SkyrimSe => 24,
            _ => 16,
        }
    }
}

bitflags::bitflags! {
    /// 归档标志（10 位）
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ArchiveFlags: u32 {
        const INCLUDE_DIRECTORY_NAMES = 0x001;
        const INCLUDE_FILE_NAMES = 0x002;
        const COMPRESSED_ARCHIVE = 0x004;
        const RETAIN_DIRECTORY_NAMES = 0x008;
        const RETAIN_FILE_NAMES = 0x010;
        const RETAIN_FILE_NAME_OFFSETS = 0x020;
        const XBOX360_ARCHIVE = 0x040;
        const RETAIN_STRINGS_DURING_STARTUP = 0x080;
        const EMBED_FILE_NAMES = 0x100;
        const XMEM_CODEC = 0x200;

        const _ = !0;
    }
}

bitflags::bitflags! {
    /// 内容类型标志（9 位）
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FileFlags: u16 {
        const MESHES = 0x001;
        const TEXTURES = 0x002;
        const MENUS = 0x004;
        const SOUNDS = 0x008;
        const VOICES = 0x010;
        const SHADERS = 0x020;
        const TREES = 0x040;
        const FONTS = 0x080;
        const MISCELLANEOUS = 0x100;

        const _ = !0;
    }
}

/// 归档标志名称表（用于显示）
pub const ARCHIVE_FLAG_NAMES: &[(u32, &str)] = &[
    (0x001, "Include Directory Names"),
    (0x002, "Include File Names"),
    (0x004, "Compressed Archive"),
    (0x008, "Retain Directory Names"),
    (0x010, "Retain File Names"),
    (0x020, "Retain File Name Offsets"),
    (0x040, "Xbox360 Archive"),
    (0x080, "Retain Strings During Startup"),
    (0x100, "Embed File Names"),
    (0x200, "XMem Codec"),
];

/// 内容类型名称表
pub const FILE_FLAG_NAMES: &[(u32, &str)] = &[
    (0x001, "Meshes"),
    (0x002, "Textures"),
    (0x004, "Menus"),
    (0x008, "Sounds"),
    (0x010, "Voices"),
    (0x020, "Shaders"),
    (0x040, "Trees"),
    (0x080, "Fonts"),
    (0x100, "Miscellaneous"),
];

/// BSA 文件头
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveHeader {
    pub version: ArchiveVersion,
    pub header_offset: u32,
    pub archive_flags: ArchiveFlags,
    pub folder_count: u32,
    pub file_count: u32,
    pub total_folder_name_length: u32,
    pub total_file_name_length: u32,
    pub file_flags: FileFlags,
    pub padding: u16,
}

impl ArchiveHeader {
    pub fn parse(cursor: &mut Cursor<&[u8]>) -> Result<Self, EspError> {
        let magic = read_tag(cursor).map_err(|_| EspError::corrupt("BSA header", "文件过短"))?;
        if &magic != BSA_MAGIC {
            return Err(EspError::corrupt(
                "BSA header",
                format!("魔数不符: {:?}", String::from_utf8_lossy(&magic)),
            ));
        }

        let raw_version = read_u32(cursor)?;
        let version = ArchiveVersion::from_u32(raw_version)
            .ok_or_else(|| EspError::UnsupportedVariant(format!("BSA 版本 {}", raw_version)))?;

        let header_offset = read_u32(cursor)?;
        let archive_flags = ArchiveFlags::from_bits_retain(read_u32(cursor)?);
        let folder_count = read_u32(cursor)?;
        let file_count = read_u32(cursor)?;
        let total_folder_name_length = read_u32(cursor)?;
        let total_file_name_length = read_u32(cursor)?;
        let file_flags = FileFlags::from_bits_retain(read_u16(cursor)?);
        let padding = read_u16(cursor)?;

        // 文件头可能比 36 字节长，跳过多余部分
        if header_offset > HEADER_SIZE {
            read_bytes(cursor, (header_offset - HEADER_SIZE) as usize)?;
        }

        Ok(ArchiveHeader {
            version,
            header_offset,
            archive_flags,
            folder_count,
            file_count,
            total_folder_name_length,
            total_file_name_length,
            file_flags,
            padding,
        })
    }

    pub fn write(&self, writer: &mut dyn Write) -> Result<(), EspError> {
        writer.write_all(BSA_MAGIC)?;
        write_u32(writer, self.version.as_u32())?;
        write_u32(writer, self.header_offset)?;
        write_u32(writer, self.archive_flags.bits())?;
        write_u32(writer, self.folder_count)?;
        write_u32(writer, self.file_count)?;
        write_u32(writer, self.total_folder_name_length)?;
        write_u32(writer, self.total_file_name_length)?;
        write_u16(writer, self.file_flags.bits())?;
        write_u16(writer, self.padding)?;
        Ok(())
    }

    pub fn is_compressed(&self) -> bool {
        self.archive_flags.contains(ArchiveFlags::COMPRESSED_ARCHIVE)
    }

    pub fn embeds_file_names(&self) -> bool {
        self.archive_flags.contains(ArchiveFlags::EMBED_FILE_NAMES)
    }

    pub fn archive_flag_names(&self) -> Vec<&'static str> {
        decode_flags(self.archive_flags.bits(), ARCHIVE_FLAG_NAMES)
    }

    pub fn file_flag_names(&self) -> Vec<&'static str> {
        decode_flags(u32::from(self.file_flags.bits()), FILE_FLAG_NAMES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header() -> ArchiveHeader {
        ArchiveHeader {
            version: ArchiveVersion::SkyrimSe,
            header_offset: HEADER_SIZE,
            archive_flags: ArchiveFlags::INCLUDE_DIRECTORY_NAMES
                | ArchiveFlags::INCLUDE_FILE_NAMES
                | ArchiveFlags::COMPRESSED_ARCHIVE,
            folder_count: 2,
            file_count: 3,
            total_folder_name_length: 20,
            total_file_name_length: 30,
            file_flags: FileFlags::MENUS | FileFlags::MISCELLANEOUS,
            padding: 0,
        }
    }

    #[test]
    fn test_header_layout() {
        let mut buffer = Vec::new();
        sample_header().write(&mut buffer).unwrap();
        assert_eq!(buffer.len(), HEADER_SIZE as usize);
        assert_eq!(&buffer[0..4], b"BSA\0");
        assert_eq!(&buffer[4..8], &105u32.to_le_bytes());

        let parsed = ArchiveHeader::parse(&mut Cursor::new(buffer.as_slice())).unwrap();
        assert_eq!(parsed, sample_header());
        assert!(parsed.is_compressed());
        assert!(!parsed.embeds_file_names());
        assert_eq!(
            parsed.archive_flag_names(),
            vec!["Include Directory Names", "Include File Names", "Compressed Archive"]
        );
        assert_eq!(parsed.file_flag_names(), vec!["Menus", "Miscellaneous"]);
    }

    #[test]
    fn test_bad_magic() {
        let mut buffer = Vec::new();
        sample_header().write(&mut buffer).unwrap();
        buffer[0] = b'X';
        let result = ArchiveHeader::parse(&mut Cursor::new(buffer.as_slice()));
        assert!(matches!(result, Err(EspError::CorruptFormat { .. })));
    }

    #[test]
    fn test_unknown_version() {
        let mut buffer = Vec::new();
        sample_header().write(&mut buffer).unwrap();
        buffer[4..8].copy_from_slice(&0x100u32.to_le_bytes());
        let result = ArchiveHeader::parse(&mut Cursor::new(buffer.as_slice()));
        assert!(matches!(result, Err(EspError::UnsupportedVariant(_))));
    }

    #[test]
    fn test_truncated_header() {
        let mut buffer = Vec::new();
        sample_header().write(&mut buffer).unwrap();
        let result = ArchiveHeader::parse(&mut Cursor::new(&buffer[..20]));
        assert!(matches!(result, Err(EspError::CorruptFormat { .. })));
    }
}
