use std::collections::HashMap;

use super::{Plugin, ReplaceReport};
use crate::string_file::{StringFileSet, StringFileType};
use crate::string_types::{ExtractedString, StringKey};
use crate::utils::EspError;

impl Plugin {
    /// 本地化插件中每个文本子记录指向的字符串表条目
    pub fn string_id_map(&self) -> HashMap<StringKey, (StringFileType, u32)> {
        let mut map = HashMap::new();
        if !self.is_localized() {
            return map;
        }

        for record in self.records() {
            let editor_id = record.editor_id();
            let master = self.resolve_master(record.form_id);

            for subrecord in record.subrecords.iter().filter(|sr| sr.is_text()) {
                let Some(id) = subrecord.string_id().filter(|&id| id != 0) else {
                    continue;
                };
                let file_type = self
                    .string_router()
                    .string_file_type(record.type_str(), subrecord.tag_str());
                let key = ExtractedString::new(
                    record.form_id,
                    master,
                    record.type_str(),
                    subrecord.tag_str(),
                    subrecord.index,
                    editor_id.clone(),
                    "",
                )
                .key();
                map.entry(key).or_insert((file_type, id));
            }
        }
        map
    }

    /// 把译文映射到字符串表条目，未翻译或找不到的条目被忽略
    pub fn localized_translations(&self, strings: &[ExtractedString]) -> HashMap<(StringFileType, u32), String> {
        let id_map = self.string_id_map();
        strings
            .iter()
            .filter_map(|string| {
                let translated = string.translated_text.as_ref()?;
                let target = id_map.get(&string.key()).copied();
                if target.is_none() {
                    tracing::debug!("{} {} 没有对应的字符串 ID", string.form_id, string.string_type);
                }
                Some((target?, translated.clone()))
            })
            .collect()
    }

    /// 应用译文
    ///
    /// 普通插件直接改写子记录；本地化插件改写传入的 STRING 文件集合，
    /// 没有提供集合时返回 `LocalizedReplacement`。
    pub fn apply_translations(
        &mut self,
        strings: &[ExtractedString],
        string_files: Option<&mut StringFileSet>,
    ) -> Result<ReplaceReport, EspError> {
        if !self.is_localized() {
            return self.replace_strings(strings);
        }

        let Some(string_files) = string_files else {
            return Err(EspError::LocalizedReplacement(format!(
                "{} 需要 STRING 文件才能写入译文",
                self.name()
            )));
        };

        let translations = self.localized_translations(strings);
        let mut report = ReplaceReport::default();
        for ((file_type, id), text) in &translations {
            match string_files.update_string(*file_type, *id, text.as_str()) {
                Ok(()) => report.replaced += 1,
                Err(EspError::FileNotFound(message)) => {
                    tracing::warn!("字符串表中缺少条目: {}", message);
                    report.not_found.push(format!("{:?} #{}", file_type, id));
                }
                Err(e) => return Err(e),
            }
        }

        tracing::info!("{}: 已更新 {} 条 STRING 文件文本", self.name(), report.replaced);
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatypes::RecordFlags;
    use crate::record::tests::record_bytes;
    use crate::string_file::{StringFile, StringLookup};

    fn localized_plugin() -> Plugin {
        let mut header = b"HEDR\x0c\x00".to_vec();
        header.extend_from_slice(&[0u8; 12]);
        let mut bytes = record_bytes(b"TES4", RecordFlags::LOCALIZED.bits(), 0, &header);

        let mut payload = b"EDID\x06\x00Sword\0FULL\x04\x00".to_vec();
        payload.extend_from_slice(&3u32.to_le_bytes());
        let record = record_bytes(b"WEAP", 0, 0x800, &payload);
        bytes.extend_from_slice(b"GRUP");
        bytes.extend_from_slice(&(24 + record.len() as u32).to_le_bytes());
        bytes.extend_from_slice(b"WEAP");
        bytes.extend_from_slice(&[0u8; 12]);
        bytes.extend_from_slice(&record);
        Plugin::from_bytes("Test.esp", &bytes).unwrap()
    }

    fn string_files() -> StringFileSet {
        let mut file = StringFile::from_bytes(&[0u8; 8], "Test", "english", StringFileType::STRINGS).unwrap();
        file.insert_string(3, "Iron Sword");
        let mut set = StringFileSet::new("Test", "english");
        set.add_file(StringFileType::STRINGS, file);
        set
    }

    #[test]
    fn test_apply_to_string_files() {
        let mut plugin = localized_plugin();
        let mut files = string_files();

        let mut strings = plugin.extract_strings(&files);
        assert_eq!(strings.len(), 1);
        strings[0].translated_text = Some("铁剑".to_string());

        let report = plugin.apply_translations(&strings, Some(&mut files)).unwrap();
        assert_eq!(report.replaced, 1);
        assert_eq!(files.lookup(StringFileType::STRINGS, 3), Some("铁剑"));
    }

    #[test]
    fn test_localized_without_string_files() {
        let mut plugin = localized_plugin();
        let strings = plugin.extract_strings(&string_files());
        assert!(matches!(
            plugin.apply_translations(&strings, None),
            Err(EspError::LocalizedReplacement(_))
        ));
    }

    #[test]
    fn test_untranslated_entries_are_ignored() {
        let plugin = localized_plugin();
        let strings = plugin.extract_strings(&string_files());
        assert!(plugin.localized_translations(&strings).is_empty());
    }
}
