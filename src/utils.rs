use std::path::Path;
use thiserror::Error;

use crate::config::StringFilter;

/// 自定义错误类型
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum EspError {
    /// 魔数不符、头部或目录截断、长度字段越界
    #[error("文件格式损坏 ({context}): {message}")]
    CorruptFormat { context: String, message: String },

    /// 路径或字符串 ID 不存在
    #[error("未找到: {0}")]
    FileNotFound(String),

    /// 未知的版本、压缩方式或字符串表类型
    #[error("不支持的格式变体: {0}")]
    UnsupportedVariant(String),

    /// 文本无法以原始编码重新编码
    #[error("编码失败: {0}")]
    EncodingFailure(String),

    /// 轻量插件的 FormID 空间耗尽
    #[error("FormID 超出轻量插件范围 (0x800-0xFFF): 已有 {count} 条本地记录")]
    FormIdOverflow { count: usize },

    /// 本地化插件的字符串位于 STRING 文件中，不能在插件内替换
    #[error("本地化子记录不能原地替换: {0}")]
    LocalizedReplacement(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl EspError {
    pub fn corrupt(context: impl Into<String>, message: impl Into<String>) -> Self {
        EspError::CorruptFormat {
            context: context.into(),
            message: message.into(),
        }
    }

    /// 批量处理时是否应跳过当前文件继续执行
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            EspError::FileNotFound(_) | EspError::UnsupportedVariant(_) | EspError::EncodingFailure(_)
        )
    }
}

/// 字符串验证函数
///
/// 过滤空文本、黑名单文本以及看起来像内部标识符的文本（驼峰或下划线命名）。
/// 该启发式存在误判，规则可通过 [`StringFilter`] 调整。
pub fn is_valid_string(text: &str, filter: &StringFilter) -> bool {
    if text.trim().is_empty() {
        return false;
    }

    // 黑名单检查
    if filter.denylist.iter().any(|d| d == text) {
        return false;
    }

    // 白名单检查
    if is_allowlisted(text, filter) {
        return true;
    }

    // 检查是否为变量名格式
    if filter.reject_identifiers && is_variable_name(text) {
        return false;
    }

    // 检查字符有效性
    text.chars()
        .all(|c| is_printable(c) || filter.extra_chars.contains(c))
}

/// 检查是否在白名单中
fn is_allowlisted(text: &str, filter: &StringFilter) -> bool {
    filter.allowlist.iter().any(|w| w == text)
        || filter.allow_contains.iter().any(|w| text.contains(w.as_str()))
}

/// 检查是否为变量名格式（驼峰或下划线）
fn is_variable_name(text: &str) -> bool {
    is_camel_case(text) || is_snake_case(text)
}

/// 可打印字符：非控制字符，空白只允许普通空格
fn is_printable(c: char) -> bool {
    !c.is_control() && (c == ' ' || !c.is_whitespace())
}

/// 检查是否为驼峰命名
pub fn is_camel_case(text: &str) -> bool {
    if text.chars().count() < 3 || !text.chars().all(char::is_alphanumeric) {
        return false;
    }

    let has_uppercase = text.chars().skip(2).any(char::is_uppercase);
    let has_lowercase = text.chars().any(char::is_lowercase);

    has_uppercase && has_lowercase
}

/// 检查是否为下划线命名
pub fn is_snake_case(text: &str) -> bool {
    !text.contains(' ') && text.contains('_')
}

/// 创建文件备份
pub fn create_backup(file_path: &Path) -> Result<std::path::PathBuf, EspError> {
    if !file_path.exists() {
        return Err(EspError::FileNotFound(file_path.display().to_string()));
    }

    let timestamp = chrono::Local::now().format("%Y-%m-%d-%H-%M-%S");
    let extension = file_path
        .extension()
        .map(|e| format!("{}.{}.bak", e.to_string_lossy(), timestamp))
        .unwrap_or_else(|| format!("{}.bak", timestamp));
    let backup_path = file_path.with_extension(extension);

    std::fs::copy(file_path, &backup_path)?;
    tracing::info!("已创建备份: {}", backup_path.display());

    Ok(backup_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid(text: &str) -> bool {
        is_valid_string(text, &StringFilter::default())
    }

    #[test]
    fn test_string_validation() {
        // 有效字符串
        assert!(valid("Iron Sword"));
        assert!(valid("This is a valid description."));
        assert!(valid("铁剑"));
        assert!(valid("这是一个有效的描述。"));
        assert!(valid("Mixed 中英文 text"));
        assert!(valid("Line one\nLine two\u{3000}"));

        // 无效字符串
        assert!(!valid("CamelCaseVariable"));
        assert!(!valid("snake_case_var"));
        assert!(!valid(""));
        assert!(!valid("   "));
        assert!(!valid("<p>"));
        assert!(!valid("bell\u{7}"));
    }

    #[test]
    fn test_allowlist_overrides_heuristics() {
        assert!(valid("WoollyRhino"));
        assert!(valid("CuSith"));
        assert!(valid("<Alias=Player_Name>"));
    }

    #[test]
    fn test_filter_is_tunable() {
        let filter = StringFilter {
            reject_identifiers: false,
            ..StringFilter::default()
        };
        assert!(is_valid_string("CamelCaseVariable", &filter));

        let filter = StringFilter {
            denylist: vec!["TODO".to_string()],
            ..StringFilter::default()
        };
        assert!(!is_valid_string("TODO", &filter));
        assert!(is_valid_string("<p>", &filter));
    }

    #[test]
    fn test_camel_case() {
        assert!(is_camel_case("CamelCase"));
        assert!(is_camel_case("myVariable"));
        assert!(!is_camel_case("lowercase"));
        assert!(!is_camel_case("UPPERCASE"));
        assert!(!is_camel_case("my"));
        assert!(!is_camel_case("Iron Sword"));
    }

    #[test]
    fn test_snake_case() {
        assert!(is_snake_case("snake_case"));
        assert!(is_snake_case("my_variable"));
        assert!(!is_snake_case("normal text"));
        assert!(!is_snake_case("CamelCase"));
    }

    #[test]
    fn test_create_backup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Plugin.esp");
        std::fs::write(&path, b"TES4").unwrap();

        let backup = create_backup(&path).unwrap();
        assert!(backup.to_string_lossy().ends_with(".bak"));
        assert_eq!(std::fs::read(backup).unwrap(), b"TES4");

        assert!(matches!(
            create_backup(&dir.path().join("missing.esp")),
            Err(EspError::FileNotFound(_))
        ));
    }
}
