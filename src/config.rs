//! 提取配置
//!
//! 所有字段都有默认值，JSON 配置文件只需写出需要覆盖的部分：
//!
//! ```json
//! { "language": "german", "filter": { "allowlist": ["WoollyRhino", "MyCreature"] } }
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::utils::EspError;

/// 文本过滤规则
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StringFilter {
    /// 完全匹配时拒绝
    pub denylist: Vec<String>,
    /// 完全匹配时接受（优先于标识符启发式）
    pub allowlist: Vec<String>,
    /// 包含任一子串时接受
    pub allow_contains: Vec<String>,
    /// 是否拒绝驼峰/下划线形式的文本
    pub reject_identifiers: bool,
    /// 除可打印字符外允许出现的字符
    pub extra_chars: String,
}

impl Default for StringFilter {
    fn default() -> Self {
        StringFilter {
            denylist: vec!["<p>".to_string()],
            allowlist: vec!["WoollyRhino".to_string(), "CuSith".to_string()],
            allow_contains: vec!["<Alias".to_string()],
            reject_identifiers: true,
            extra_chars: "\n\r\t\u{200b}\u{a0}\u{3000}".to_string(),
        }
    }
}

/// 字符串提取选项
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractOptions {
    pub filter: StringFilter,
    /// 同时输出被过滤的文本（状态为 NoTranslationRequired）
    pub unfiltered: bool,
    /// STRING 文件语言
    pub language: String,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        ExtractOptions {
            filter: StringFilter::default(),
            unfiltered: false,
            language: "english".to_string(),
        }
    }
}

impl ExtractOptions {
    /// 从 JSON 文件加载
    pub fn load(path: &Path) -> Result<Self, EspError> {
        let content = std::fs::read_to_string(path)?;
        let options = serde_json::from_str(&content)?;
        Ok(options)
    }
}
