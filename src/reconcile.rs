//! 译文合并
//!
//! 把一份已翻译的提取结果合并到新的原文提取结果上。
//! 先按标识键匹配；FormID 被重新编号（ESL 转换、主文件顺序变化）时退回按原文匹配。

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::string_types::{ExtractedString, StringKey, StringStatus};

/// 各状态的数量
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileSummary {
    pub total: usize,
    pub complete: usize,
    pub incomplete: usize,
    pub required: usize,
    pub no_translation_required: usize,
}

impl ReconcileSummary {
    pub fn from_strings(strings: &[ExtractedString]) -> Self {
        let mut summary = ReconcileSummary {
            total: strings.len(),
            ..Default::default()
        };
        for string in strings {
            match string.status {
                StringStatus::TranslationComplete => summary.complete += 1,
                StringStatus::TranslationIncomplete => summary.incomplete += 1,
                StringStatus::TranslationRequired => summary.required += 1,
                StringStatus::NoTranslationRequired => summary.no_translation_required += 1,
                StringStatus::NoneStatus => {}
            }
        }
        summary
    }
}

impl std::fmt::Display for ReconcileSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "共 {} 条: 完成 {}, 待复核 {}, 待翻译 {}, 无需翻译 {}",
            self.total, self.complete, self.incomplete, self.required, self.no_translation_required
        )
    }
}

/// 按标识键去重，保留第一次出现的条目
pub fn unique(strings: &[ExtractedString]) -> Vec<&ExtractedString> {
    let mut seen: HashSet<StringKey> = HashSet::with_capacity(strings.len());
    strings.iter().filter(|string| seen.insert(string.key())).collect()
}

/// 合并原文与译文
///
/// 输出与去重后的 `original` 一一对应：
/// 标识键命中为 `TranslationComplete`，仅原文命中为 `TranslationIncomplete`，
/// 都未命中为 `TranslationRequired`。
///
/// # 参数
/// * `original` - 当前插件的提取结果
/// * `translated` - 旧版本的译文；同一标识键或同一原文出现多次时取第一条
pub fn reconcile(original: &[ExtractedString], translated: &[ExtractedString]) -> Vec<ExtractedString> {
    let translated = unique(translated);

    let mut by_key: HashMap<StringKey, &ExtractedString> = HashMap::with_capacity(translated.len());
    let mut by_text: HashMap<&str, &ExtractedString> = HashMap::with_capacity(translated.len());
    for &string in &translated {
        by_key.entry(string.key()).or_insert(string);
        by_text.entry(string.original_text.as_str()).or_insert(string);
    }

    let merged: Vec<ExtractedString> = unique(original)
        .into_iter()
        .map(|string| {
            let mut merged = string.clone();
            if let Some(found) = by_key.get(&string.key()) {
                merged.translated_text = Some(found.text_to_apply().to_string());
                merged.status = StringStatus::TranslationComplete;
            } else if let Some(found) = by_text.get(string.original_text.as_str()) {
                merged.translated_text = Some(found.text_to_apply().to_string());
                merged.status = StringStatus::TranslationIncomplete;
            } else {
                merged.translated_text = None;
                merged.status = StringStatus::TranslationRequired;
            }
            merged
        })
        .collect();

    tracing::info!("{}", ReconcileSummary::from_strings(&merged));
    merged
}
