/// IO 抽象层 - trait 定义

use std::ops::Deref;
use std::path::Path;

use memmap2::Mmap;

use crate::utils::EspError;

/// 文件字节来源
///
/// 大文件走内存映射，测试与归档内文件使用内存缓冲。
#[derive(Debug)]
pub enum FileBytes {
    Mapped(Mmap),
    Owned(Vec<u8>),
}

impl Deref for FileBytes {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            FileBytes::Mapped(mmap) => &mmap[..],
            FileBytes::Owned(bytes) => bytes,
        }
    }
}

impl From<Vec<u8>> for FileBytes {
    fn from(bytes: Vec<u8>) -> Self {
        FileBytes::Owned(bytes)
    }
}

/// 文件读取 trait
///
/// 不负责解析，仅负责 IO。路径不存在时返回 `EspError::FileNotFound`。
pub trait FileReader {
    fn read(&self, path: &Path) -> Result<FileBytes, EspError>;
}

/// 文件写入 trait
///
/// # 职责
/// - 写入前创建父目录
/// - 写入不完整（字节数不符或为空）时删除目标文件，不留下截断的文件
pub trait FileWriter {
    fn write(&self, bytes: &[u8], path: &Path) -> Result<(), EspError>;
}
