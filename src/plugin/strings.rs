use std::collections::{HashMap, HashSet};

use rayon::prelude::*;
use serde::Serialize;

use super::Plugin;
use crate::config::ExtractOptions;
use crate::datatypes::RawString;
use crate::record::Record;
use crate::string_file::StringLookup;
use crate::string_types::{ExtractedString, StringStatus};
use crate::subrecord::Subrecord;
use crate::utils::{is_valid_string, EspError};

/// 写回译文的结果
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReplaceReport {
    /// 实际改写的子记录数
    pub replaced: usize,
    /// 匹配到但文本未变化
    pub unchanged: usize,
    /// 以 UTF-8 代替原始编码写入的条目数
    pub encoding_fallbacks: usize,
    /// 在插件中找不到的条目
    pub not_found: Vec<String>,
    /// 本地化插件中无法原地替换的条目
    pub localized: Vec<String>,
}

impl ReplaceReport {
    /// 存在本地化条目时返回错误，调用方应改写 STRING 文件
    pub fn check_localized(&self) -> Result<(), EspError> {
        if self.localized.is_empty() {
            return Ok(());
        }
        Err(EspError::LocalizedReplacement(format!(
            "{} 条文本位于 STRING 文件中",
            self.localized.len()
        )))
    }
}

/// 替换时的匹配键：去掉主文件字节的 FormID、类型、索引、原文
type ReplaceKey = (String, String, Option<i64>, String);

fn replace_key(string: &ExtractedString) -> ReplaceKey {
    (
        string.local_form_id(),
        string.string_type.clone(),
        string.index,
        string.original_text.clone(),
    )
}

impl Plugin {
    /// 使用默认选项提取字符串
    pub fn extract_strings(&self, lookup: &dyn StringLookup) -> Vec<ExtractedString> {
        self.extract_strings_with(lookup, &ExtractOptions::default())
    }

    /// 提取所有可翻译字符串（按顶级组并行）
    ///
    /// 本地化插件的子记录只保存字符串 ID，文本通过 `lookup` 取得；
    /// ID 为 0 或查不到的条目被跳过。
    ///
    /// # 参数
    /// * `lookup` - 字符串表查找器，非本地化插件传 `&NoStrings`
    /// * `options` - 文本过滤规则
    ///
    /// # 返回
    /// 按组、记录、子记录顺序排列的字符串，状态均为 `TranslationRequired`
    pub fn extract_strings_with(&self, lookup: &dyn StringLookup, options: &ExtractOptions) -> Vec<ExtractedString> {
        let strings: Vec<ExtractedString> = self
            .groups
            .par_iter()
            .flat_map_iter(|group| {
                group
                    .records()
                    .into_iter()
                    .flat_map(|record| self.extract_record_strings(record, lookup, options))
                    .collect::<Vec<_>>()
            })
            .collect();

        tracing::debug!("{}: 提取了 {} 条字符串", self.name(), strings.len());
        strings
    }

    fn extract_record_strings(
        &self,
        record: &Record,
        lookup: &dyn StringLookup,
        options: &ExtractOptions,
    ) -> Vec<ExtractedString> {
        let mut strings = Vec::new();
        if !record.subrecords.iter().any(Subrecord::is_text) {
            return strings;
        }

        let editor_id = record.editor_id();
        let master = self.resolve_master(record.form_id);

        for subrecord in record.subrecords.iter().filter(|sr| sr.is_text()) {
            let Some(text) = self.subrecord_text(record, subrecord, lookup) else {
                continue;
            };

            let valid = is_valid_string(&text, &options.filter);
            if !valid && !options.unfiltered {
                continue;
            }

            let mut string = ExtractedString::new(
                record.form_id,
                master,
                record.type_str(),
                subrecord.tag_str(),
                subrecord.index,
                editor_id.clone(),
                text,
            );
            if !valid {
                string.status = StringStatus::NoTranslationRequired;
            }
            strings.push(string);
        }

        strings
    }

    /// 子记录的文本：内嵌文本直接解码，本地化文本经字符串表查找
    fn subrecord_text(&self, record: &Record, subrecord: &Subrecord, lookup: &dyn StringLookup) -> Option<String> {
        if !self.is_localized() {
            return Some(subrecord.text().content);
        }

        let id = subrecord.string_id()?;
        if id == 0 {
            return None;
        }

        let file_type = self
            .string_router()
            .string_file_type(record.type_str(), subrecord.tag_str());
        match lookup.lookup(file_type, id) {
            Some(text) => Some(text.to_string()),
            None => {
                tracing::debug!(
                    "字符串 ID {} 在 {:?} 中不存在 ({} {} [{:08X}])",
                    id,
                    file_type,
                    record.type_str(),
                    subrecord.tag_str(),
                    record.form_id
                );
                None
            }
        }
    }

    /// 将译文写回插件
    ///
    /// 按 FormID（忽略主文件字节）、类型、索引和原文定位子记录，
    /// 新文本使用子记录原来的编码写入。
    ///
    /// # 参数
    /// * `strings` - 带译文的条目，没有译文时写回原文
    ///
    /// # 返回
    /// `ReplaceReport`：替换数、未变化数、未找到的条目和改用 UTF-8 的次数。
    /// 本地化插件不修改任何子记录，只在报告中标记。
    pub fn replace_strings(&mut self, strings: &[ExtractedString]) -> Result<ReplaceReport, EspError> {
        let mut report = ReplaceReport::default();

        if self.is_localized() {
            report.localized = strings.iter().map(describe).collect();
            tracing::warn!(
                "{} 是本地化插件，{} 条文本需要写入 STRING 文件",
                self.name(),
                strings.len()
            );
            return Ok(report);
        }

        let mut wanted: HashMap<ReplaceKey, &ExtractedString> = HashMap::new();
        for string in strings {
            wanted.entry(replace_key(string)).or_insert(string);
        }

        let mut matched: HashSet<ReplaceKey> = HashSet::new();
        for record in self.records_mut() {
            let local_form_id = format!("{:06x}", record.form_id & 0x00FF_FFFF);
            let string_type_prefix = record.type_str().to_string();

            for position in 0..record.subrecords.len() {
                let subrecord = &record.subrecords[position];
                if !subrecord.is_text() {
                    continue;
                }

                let original = subrecord.text();
                let key = (
                    local_form_id.clone(),
                    format!("{} {}", string_type_prefix, subrecord.tag_str()),
                    subrecord.index,
                    original.content.clone(),
                );
                let Some(string) = wanted.get(&key).copied() else {
                    continue;
                };
                matched.insert(key);

                let new_text = string.text_to_apply();
                if new_text == original.content {
                    report.unchanged += 1;
                    continue;
                }

                let data = match RawString::new(new_text, original.encoding.as_str()).encode_zstring() {
                    Ok(data) => data,
                    Err(EspError::EncodingFailure(message)) => {
                        tracing::warn!("{}，改用 UTF-8: {}", message, describe(string));
                        report.encoding_fallbacks += 1;
                        RawString::new(new_text, "utf-8").encode_zstring()?
                    }
                    Err(e) => return Err(e),
                };
                record.set_subrecord_data(position, data)?;
                report.replaced += 1;
            }
        }

        report.not_found = strings
            .iter()
            .filter(|string| !matched.contains(&replace_key(string)))
            .map(describe)
            .collect();
        for missing in &report.not_found {
            tracing::warn!("未找到对应子记录: {}", missing);
        }

        tracing::info!(
            "{}: 替换 {} 条, 未变化 {} 条, 未找到 {} 条",
            self.name(),
            report.replaced,
            report.unchanged,
            report.not_found.len()
        );
        Ok(report)
    }
}

fn describe(string: &ExtractedString) -> String {
    format!(
        "[{}|{}] {} #{}",
        string.form_id,
        string.master,
        string.string_type,
        string.index.map_or_else(|| "-".to_string(), |i| i.to_string())
    )
}
