use std::path::Path;

use super::Plugin;
use crate::io::{DefaultFileWriter, FileWriter};
use crate::utils::{create_backup, EspError};

impl Plugin {
    /// 序列化整个插件，各层长度按内容重新计算
    pub fn to_bytes(&self) -> Result<Vec<u8>, EspError> {
        let mut output = Vec::new();
        self.header.write(&mut output)?;
        for group in &self.groups {
            group.write(&mut output)?;
        }
        Ok(output)
    }

    /// 写入文件，目标已存在时先创建时间戳备份
    pub fn write_to_file(&self, path: &Path) -> Result<(), EspError> {
        self.write_with_writer(path, &DefaultFileWriter, true)
    }

    pub fn write_with_writer(&self, path: &Path, writer: &dyn FileWriter, backup: bool) -> Result<(), EspError> {
        let bytes = self.to_bytes()?;
        if backup && path.exists() {
            let backup_path = create_backup(path)?;
            tracing::info!("已创建备份: {}", backup_path.display());
        }
        writer.write(&bytes, path)?;
        tracing::info!("已写入 {} ({} 字节)", path.display(), bytes.len());
        Ok(())
    }
}
