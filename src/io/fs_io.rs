/// 基于文件系统的默认读写实现
use std::fs::File;
use std::io::Write;
use std::path::Path;

use memmap2::Mmap;

use super::traits::{FileBytes, FileReader, FileWriter};
use crate::utils::EspError;

/// 默认读取器（内存映射）
#[derive(Debug, Clone, Default)]
pub struct DefaultFileReader;

impl FileReader for DefaultFileReader {
    fn read(&self, path: &Path) -> Result<FileBytes, EspError> {
        let file = File::open(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => EspError::FileNotFound(path.display().to_string()),
            _ => EspError::IoError(e),
        })?;

        // 空文件无法映射
        if file.metadata()?.len() == 0 {
            return Ok(FileBytes::Owned(Vec::new()));
        }

        // SAFETY: 映射只读，文件在 Plugin/Archive 生命周期内不应被外部修改
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(FileBytes::Mapped(mmap))
    }
}

/// 默认写入器（基于 std::fs）
#[derive(Debug, Clone, Default)]
pub struct DefaultFileWriter;

impl FileWriter for DefaultFileWriter {
    fn write(&self, bytes: &[u8], path: &Path) -> Result<(), EspError> {
        // 确保父目录存在
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let result = write_all_synced(bytes, path);

        let written = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
        if result.is_err() || written != bytes.len() as u64 {
            // 不保留截断的文件
            if path.exists() {
                let _ = std::fs::remove_file(path);
            }
            tracing::warn!(
                "写入不完整，已删除 {} ({} / {} 字节)",
                path.display(),
                written,
                bytes.len()
            );
            result?;
            return Err(EspError::corrupt(
                path.display().to_string(),
                format!("写入了 {} 字节，预期 {} 字节", written, bytes.len()),
            ));
        }

        Ok(())
    }
}

fn write_all_synced(bytes: &[u8], path: &Path) -> Result<(), EspError> {
    let mut file = File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    Ok(())
}
