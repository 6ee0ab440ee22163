use std::path::Path;

use crate::bsa::{Archive, BsaStringsProvider};
use crate::utils::EspError;

use super::{StringFile, StringFileSet, StringFileType};

impl StringFileSet {
    /// 从已打开的归档中加载 `strings/<plugin>_<language>.<ext>`
    ///
    /// 单个文件解析失败只记录警告；一个都没有时返回 FileNotFound。
    pub fn load_from_archive(archive: &Archive, plugin_name: &str, language: &str) -> Result<Self, EspError> {
        let mut set = StringFileSet::new(plugin_name, language);

        for file_type in StringFileType::ALL {
            let path = format!("strings/{}_{}.{}", plugin_name, language, file_type.to_extension());
            let data = match archive.extract_to_memory(&path) {
                Ok(data) => data,
                Err(EspError::FileNotFound(_)) => continue,
                Err(e) => return Err(e),
            };

            match StringFile::from_bytes(&data, plugin_name, language, file_type) {
                Ok(file) => {
                    tracing::debug!("从归档加载 {} ({} 条)", path, file.count());
                    set.files.insert(file_type, file);
                }
                Err(e) => tracing::warn!("归档中的 {} 解析失败: {}", path, e),
            }
        }

        if set.files.is_empty() {
            return Err(EspError::FileNotFound(format!(
                "归档中没有 {}_{} 的字符串表",
                plugin_name, language
            )));
        }
        Ok(set)
    }

    /// 按插件路径定位归档（官方主文件用 `Skyrim - Interface.bsa`）并加载
    pub fn load_from_bsa(plugin_path: &Path, language: &str) -> Result<Self, EspError> {
        let provider = BsaStringsProvider::open_for_plugin(plugin_path)?;
        let plugin_name = plugin_path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| EspError::FileNotFound(format!("无效的插件路径: {}", plugin_path.display())))?;
        Self::load_from_archive(provider.archive(), plugin_name, language)
    }

    /// 先查 `Strings/` 目录，找不到任何文件时再查归档
    pub fn load_for_plugin(plugin_path: &Path, language: &str) -> Result<Self, EspError> {
        let plugin_dir = plugin_path.parent().unwrap_or_else(|| Path::new(""));
        let plugin_name = plugin_path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| EspError::FileNotFound(format!("无效的插件路径: {}", plugin_path.display())))?;

        let from_dir = StringFileSet::load_from_directory(&plugin_dir.join("Strings"), plugin_name, language)?;
        if !from_dir.files.is_empty() {
            return Ok(from_dir);
        }

        tracing::info!("{} 没有独立字符串表，尝试从归档加载", plugin_name);
        Self::load_from_bsa(plugin_path, language)
    }
}
