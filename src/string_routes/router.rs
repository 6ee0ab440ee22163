use std::collections::HashMap;

use crate::string_file::StringFileType;
use crate::utils::EspError;

/// 判断哪些记录/子记录组合包含可提取的字符串
pub trait StringRouter: Send + Sync + std::fmt::Debug {
    /// 记录类型支持的字符串子记录类型，不含字符串时返回 None
    fn get_string_subrecord_types(&self, record_type: &str) -> Option<&[String]>;

    fn supports_strings(&self, record_type: &str, subrecord_type: &str) -> bool {
        self.get_string_subrecord_types(record_type)
            .is_some_and(|types| types.iter().any(|t| t == subrecord_type))
    }

    /// 本地化插件中该字段的 ID 存在哪类字符串表
    ///
    /// INFO 记录 → ILSTRINGS；DESC/CNAM → DLSTRINGS；其余 → STRINGS。
    fn string_file_type(&self, record_type: &str, subrecord_type: &str) -> StringFileType {
        if record_type == "INFO" {
            StringFileType::ILSTRINGS
        } else if matches!(subrecord_type, "DESC" | "CNAM") {
            StringFileType::DLSTRINGS
        } else {
            StringFileType::STRINGS
        }
    }
}

/// 基于映射表的路由器
#[derive(Debug, Clone)]
pub struct DefaultStringRouter {
    routes: HashMap<String, Vec<String>>,
}

impl DefaultStringRouter {
    pub fn new(routes: HashMap<String, Vec<String>>) -> Self {
        Self { routes }
    }

    /// 使用内置的 string_records.json
    pub fn from_embedded_data() -> Result<Self, EspError> {
        Ok(Self::new(super::load_string_records()?))
    }

    /// 所有包含字符串的记录类型（已排序）
    pub fn record_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.routes.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }
}

impl StringRouter for DefaultStringRouter {
    fn get_string_subrecord_types(&self, record_type: &str) -> Option<&[String]> {
        self.routes.get(record_type).map(Vec::as_slice)
    }
}
