//! BSA Strings 文件提供者
//!
//! 专门用于从 BSA 归档中提取 .strings / .ilstrings / .dlstrings 文件

use std::path::Path;

use super::Archive;
use crate::string_file::StringFileType;
use crate::utils::EspError;

/// 官方主文件列表（这些文件共享 "Skyrim - Interface.bsa"）
/// 注意：不含扩展名，因为 plugin_name 来自 file_stem()
const OFFICIAL_MASTER_FILES: &[&str] = &[
    "skyrim",
    "update",
    "dawnguard",
    "dragonborn",
    "hearthfires",
];

/// 从 BSA 中提取 Strings 文件的专用接口
#[derive(Debug)]
pub struct BsaStringsProvider {
    archive: Archive,
}

impl BsaStringsProvider {
    pub fn new(archive: Archive) -> Self {
        Self { archive }
    }

    /// 为指定的插件打开对应的 BSA 归档
    ///
    /// # 查找规则
    /// 1. 官方主文件使用 `Skyrim - Interface.bsa`
    /// 2. 其他插件使用同名 BSA（例如 `MyMod.esp` → `MyMod.bsa`）
    pub fn open_for_plugin<P: AsRef<Path>>(plugin_path: P) -> Result<Self, EspError> {
        let plugin_path = plugin_path.as_ref();
        let plugin_dir = plugin_path.parent().unwrap_or_else(|| Path::new(""));

        let plugin_name = plugin_path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| EspError::FileNotFound(format!("无效的插件路径: {}", plugin_path.display())))?;

        let bsa_path = if Self::is_official_master(plugin_name) {
            plugin_dir.join("Skyrim - Interface.bsa")
        } else {
            plugin_dir.join(format!("{}.bsa", plugin_name))
        };

        if !bsa_path.exists() {
            return Err(EspError::FileNotFound(format!("BSA 文件不存在: {}", bsa_path.display())));
        }

        Ok(Self {
            archive: Archive::open(bsa_path)?,
        })
    }

    /// 提取指定的 strings 文件
    ///
    /// 归档路径不区分大小写，统一查找 `strings/<plugin>_<language>.<ext>`。
    pub fn extract_strings(
        &self,
        plugin_name: &str,
        language: &str,
        file_type: StringFileType,
    ) -> Result<Vec<u8>, EspError> {
        let path = format!(
            "strings/{}_{}.{}",
            plugin_name,
            language,
            file_type.to_extension()
        );
        self.archive.extract_to_memory(&path)
    }

    /// 列出 BSA 中所有的 strings 文件
    pub fn list_strings_files(&self) -> Vec<String> {
        self.archive
            .list_paths()
            .into_iter()
            .filter(|path| {
                path.rsplit('.')
                    .next()
                    .and_then(StringFileType::from_extension)
                    .is_some()
            })
            .collect()
    }

    /// 检查插件是否为官方主文件
    fn is_official_master(plugin_name: &str) -> bool {
        let lower = plugin_name.to_lowercase();
        OFFICIAL_MASTER_FILES.contains(&lower.as_str())
    }

    pub fn archive(&self) -> &Archive {
        &self.archive
    }
}
