//! 本地化字符串表（.STRINGS / .DLSTRINGS / .ILSTRINGS）
//!
//! 文件布局：`u32 数量`、`u32 数据区大小`、`数量 × (u32 id, u32 相对偏移)` 目录，
//! 之后是数据区。数据区起点 = 文件总长 − 数据区大小。

mod bsa;
mod file;
mod io;
mod set;


use std::collections::HashMap;
use std::path::Path;

pub use file::StringFile;
pub use io::parse_filename;
pub use set::StringFileSet;

use xxhash_rust::xxh3::Xxh3;

use crate::io::{DefaultFileReader, FileReader};
use crate::utils::EspError;

/// Bethesda字符串文件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum StringFileType {
    /// 对话字符串文件
    DLSTRINGS,
    /// 界面字符串文件
    ILSTRINGS,
    /// 一般字符串文件
    STRINGS,
}

impl StringFileType {
    pub const ALL: [StringFileType; 3] = [
        StringFileType::STRINGS,
        StringFileType::ILSTRINGS,
        StringFileType::DLSTRINGS,
    ];

    /// 从文件扩展名获取字符串文件类型（不区分大小写）
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_uppercase().as_str() {
            "DLSTRINGS" => Some(StringFileType::DLSTRINGS),
            "ILSTRINGS" => Some(StringFileType::ILSTRINGS),
            "STRINGS" => Some(StringFileType::STRINGS),
            _ => None,
        }
    }

    /// 从路径扩展名推断，未知扩展名返回 `UnsupportedVariant`
    pub fn from_path(path: &Path) -> Result<Self, EspError> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
            .ok_or_else(|| EspError::UnsupportedVariant(format!("不支持的字符串文件: {}", path.display())))
    }

    pub fn to_extension(&self) -> &'static str {
        match self {
            StringFileType::DLSTRINGS => "DLSTRINGS",
            StringFileType::ILSTRINGS => "ILSTRINGS",
            StringFileType::STRINGS => "STRINGS",
        }
    }

    /// DLSTRINGS 与 ILSTRINGS 的条目带 u32 长度前缀
    pub fn has_length_prefix(&self) -> bool {
        matches!(self, StringFileType::DLSTRINGS | StringFileType::ILSTRINGS)
    }
}

/// 字符串表中的一个条目
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct StringEntry {
    pub id: u32,
    /// 相对数据区起点的偏移（重建后失效）
    pub relative_offset: u32,
    pub content: String,
    /// 解码时识别出的编码，重建时沿用
    pub encoding: String,
}

impl StringEntry {
    pub fn new(id: u32, content: impl Into<String>) -> Self {
        Self {
            id,
            relative_offset: 0,
            content: content.into(),
            encoding: "utf-8".to_string(),
        }
    }
}

/// 按字符串表类型与 ID 查找本地化文本
///
/// 插件处于本地化模式时，字符串子记录只存 ID，通过该接口取回文本。
pub trait StringLookup: Sync {
    fn lookup(&self, file_type: StringFileType, id: u32) -> Option<&str>;

    /// 内容指纹，条目相同的查找器给出相同的值（用作缓存键）
    fn fingerprint(&self) -> u64;
}

/// 对 (类型, ID, 文本) 条目计算与顺序无关的指纹
pub(crate) fn fingerprint_entries<'a>(entries: impl Iterator<Item = (StringFileType, u32, &'a str)>) -> u64 {
    let mut sorted: Vec<_> = entries.collect();
    sorted.sort_by_key(|&(file_type, id, _)| (file_type.to_extension(), id));

    let mut hasher = Xxh3::new();
    for (file_type, id, text) in sorted {
        hasher.update(file_type.to_extension().as_bytes());
        hasher.update(&id.to_le_bytes());
        hasher.update(text.as_bytes());
        hasher.update(&[0]);
    }
    hasher.digest()
}

/// 不提供任何字符串的查找器（非本地化插件使用）
#[derive(Debug, Default, Clone, Copy)]
pub struct NoStrings;

impl StringLookup for NoStrings {
    fn lookup(&self, _file_type: StringFileType, _id: u32) -> Option<&str> {
        None
    }

    fn fingerprint(&self) -> u64 {
        fingerprint_entries(std::iter::empty())
    }
}

impl StringLookup for HashMap<(StringFileType, u32), String> {
    fn lookup(&self, file_type: StringFileType, id: u32) -> Option<&str> {
        self.get(&(file_type, id)).map(String::as_str)
    }

    fn fingerprint(&self) -> u64 {
        fingerprint_entries(self.iter().map(|(&(file_type, id), text)| (file_type, id, text.as_str())))
    }
}

/// 解析单个字符串表文件，返回 ID → 文本
///
/// 空文本与纯空白文本会被丢弃。
///
/// # 参数
/// * `path` - 表文件路径
/// * `file_type` - 决定条目是否带长度前缀
///
/// # 错误
/// 目录偏移超出数据区时返回 `CorruptFormat`
pub fn parse_string_table(path: &Path, file_type: StringFileType) -> Result<HashMap<u32, String>, EspError> {
    let data = DefaultFileReader.read(path)?;
    let entries = StringFile::parse_entries(&data, file_type)?;

    Ok(entries
        .into_values()
        .filter(|entry| !entry.content.trim().is_empty())
        .map(|entry| (entry.id, entry.content))
        .collect())
}
