use serde::{Deserialize, Serialize};

/// 翻译状态
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StringStatus {
    #[default]
    NoneStatus,
    /// 被文本过滤器拒绝（仅在不过滤提取时出现）
    NoTranslationRequired,
    /// 按标识键找到了译文
    TranslationComplete,
    /// 仅按原文找到译文，需要人工复核
    TranslationIncomplete,
    TranslationRequired,
}

/// 提取的字符串结构
///
/// `translated_text` 和 `status` 在提取后仍会被修改，因此不参与标识键。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedString {
    /// 8 位十六进制 FormID（含主文件索引字节）
    pub form_id: String,
    /// 最初定义此记录的插件文件名
    pub master: String,
    /// "记录类型 子记录类型"，例如 "WEAP FULL"
    #[serde(rename = "type")]
    pub string_type: String,
    pub index: Option<i64>,
    pub editor_id: Option<String>,
    pub original_text: String,
    #[serde(default)]
    pub translated_text: Option<String>,
    #[serde(default)]
    pub status: StringStatus,
}

/// 跨两次提取识别同一字符串的键
///
/// FormID 去掉了主文件索引字节，因此主文件重排或 ESL 重编号高位后仍能匹配。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StringKey {
    form_id: String,
    master: String,
    editor_id: Option<String>,
    string_type: String,
    index: Option<i64>,
}

impl ExtractedString {
    pub fn new(
        form_id: u32,
        master: impl Into<String>,
        record_type: &str,
        subrecord_type: &str,
        index: Option<i64>,
        editor_id: Option<String>,
        original_text: impl Into<String>,
    ) -> Self {
        ExtractedString {
            form_id: format!("{:08X}", form_id),
            master: master.into(),
            string_type: format!("{} {}", record_type, subrecord_type),
            index,
            editor_id,
            original_text: original_text.into(),
            translated_text: None,
            status: StringStatus::TranslationRequired,
        }
    }

    pub fn key(&self) -> StringKey {
        StringKey {
            form_id: form_id_without_master(&self.form_id),
            master: self.master.to_lowercase(),
            editor_id: self.editor_id.clone(),
            string_type: self.string_type.clone(),
            index: self.index,
        }
    }

    pub fn record_type(&self) -> &str {
        self.string_type.split_once(' ').map_or(&self.string_type, |(record, _)| record)
    }

    pub fn subrecord_type(&self) -> &str {
        self.string_type.split_once(' ').map_or("", |(_, subrecord)| subrecord)
    }

    /// 写回插件时使用的文本：有译文用译文，否则保留原文
    pub fn text_to_apply(&self) -> &str {
        self.translated_text.as_deref().unwrap_or(&self.original_text)
    }

    /// 去掉主文件索引字节后的 FormID，小写
    pub fn local_form_id(&self) -> String {
        form_id_without_master(&self.form_id)
    }
}

fn form_id_without_master(form_id: &str) -> String {
    form_id.get(2..).unwrap_or(form_id).to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(form_id: u32) -> ExtractedString {
        ExtractedString::new(form_id, "MyMod.esp", "QUST", "FULL", None, Some("MyQuest".to_string()), "My Quest")
    }

    #[test]
    fn test_new_formats_fields() {
        let string = sample(0x0100_0D62);
        assert_eq!(string.form_id, "01000D62");
        assert_eq!(string.string_type, "QUST FULL");
        assert_eq!(string.record_type(), "QUST");
        assert_eq!(string.subrecord_type(), "FULL");
        assert_eq!(string.status, StringStatus::TranslationRequired);
        assert_eq!(string.local_form_id(), "000d62");
    }

    #[test]
    fn test_key_ignores_master_index_and_mutable_fields() {
        let original = sample(0x0100_0D62);
        let mut renumbered = sample(0x0300_0D62);
        renumbered.translated_text = Some("Meine Quest".to_string());
        renumbered.status = StringStatus::TranslationComplete;

        assert_eq!(original.key(), renumbered.key());
        assert_ne!(original.key(), sample(0x0100_0D63).key());
    }

    #[test]
    fn test_text_to_apply() {
        let mut string = sample(0x800);
        assert_eq!(string.text_to_apply(), "My Quest");
        string.translated_text = Some("Meine Quest".to_string());
        assert_eq!(string.text_to_apply(), "Meine Quest");
    }

    #[test]
    fn test_json_shape() {
        let json = serde_json::to_value(sample(0x800)).unwrap();
        assert_eq!(json["type"], "QUST FULL");
        assert_eq!(json["form_id"], "00000800");
        assert_eq!(json["status"], "TranslationRequired");

        let parsed: ExtractedString = serde_json::from_str(
            r#"{"form_id":"00000800","master":"MyMod.esp","type":"QUST FULL","index":null,
                "editor_id":"MyQuest","original_text":"My Quest"}"#,
        )
        .unwrap();
        assert_eq!(parsed.status, StringStatus::NoneStatus);
        assert_eq!(parsed.translated_text, None);
    }
}
