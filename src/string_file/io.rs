use std::path::{Path, PathBuf};

use crate::utils::EspError;

use super::StringFileType;

/// 从 `PluginName_language.EXT` 解析插件名、语言与类型
///
/// 插件名本身可能包含下划线，因此从右侧切分。
pub fn parse_filename(path: &Path) -> Result<(String, String, StringFileType), EspError> {
    let file_type = StringFileType::from_path(path)?;

    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| EspError::UnsupportedVariant(format!("无效的文件名: {}", path.display())))?;

    match stem.rsplit_once('_') {
        Some((plugin_name, language)) if !plugin_name.is_empty() && !language.is_empty() => {
            Ok((plugin_name.to_string(), language.to_string(), file_type))
        }
        _ => Err(EspError::UnsupportedVariant(format!(
            "文件名格式错误，应为 PluginName_Language.EXT: {}",
            path.display()
        ))),
    }
}

/// 目录中可能的文件名大小写变体
pub(crate) fn build_filename_variants(
    directory: &Path,
    plugin_name: &str,
    language: &str,
    file_type: StringFileType,
) -> Vec<PathBuf> {
    let extension = file_type.to_extension();
    let mut candidates = Vec::new();

    for name in [
        plugin_name.to_string(),
        plugin_name.to_lowercase(),
        plugin_name.to_uppercase(),
    ] {
        for ext in [extension.to_string(), extension.to_lowercase()] {
            let candidate = directory.join(format!("{}_{}.{}", name, language, ext));
            if !candidates.contains(&candidate) {
                candidates.push(candidate);
            }
        }
    }

    candidates
}

/// 在目录中按不区分大小写的方式查找字符串表
///
/// 先尝试常见变体，再退回逐项扫描目录。
pub(crate) fn find_string_file(
    directory: &Path,
    plugin_name: &str,
    language: &str,
    file_type: StringFileType,
) -> Option<PathBuf> {
    if let Some(found) = build_filename_variants(directory, plugin_name, language, file_type)
        .into_iter()
        .find(|p| p.is_file())
    {
        return Some(found);
    }

    let wanted = format!("{}_{}.{}", plugin_name, language, file_type.to_extension()).to_lowercase();
    std::fs::read_dir(directory)
        .ok()?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .find(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.to_lowercase() == wanted)
        })
}
