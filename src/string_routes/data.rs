use std::collections::HashMap;

use crate::utils::EspError;

/// 加载内置的 string_records.json（记录类型 → 字符串子记录类型）
pub(crate) fn load_string_records() -> Result<HashMap<String, Vec<String>>, EspError> {
    let json_data = include_str!("../../data/string_records.json");
    Ok(serde_json::from_str(json_data)?)
}
