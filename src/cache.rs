//! 提取结果缓存
//!
//! 缓存是显式传入的对象，可选地持久化为 JSON。
//! 文件标识只哈希首尾各 1 MiB 与文件长度，大插件也能快速计算。

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use xxhash_rust::xxh3::Xxh3;

use crate::config::ExtractOptions;
use crate::io::{DefaultFileReader, DefaultFileWriter, FileReader, FileWriter};
use crate::plugin::Plugin;
use crate::string_file::StringLookup;
use crate::string_types::ExtractedString;
use crate::utils::EspError;

const SAMPLE_SIZE: usize = 1024 * 1024;

/// 文件内容标识（十六进制）
pub fn file_identifier(path: &Path) -> Result<String, EspError> {
    let data = DefaultFileReader.read(path)?;
    Ok(bytes_identifier(&data))
}

/// 字节内容标识，与 [`file_identifier`] 对同样内容给出相同结果
pub fn bytes_identifier(data: &[u8]) -> String {
    let mut hasher = Xxh3::new();
    if data.len() <= SAMPLE_SIZE * 2 {
        hasher.update(data);
    } else {
        hasher.update(&data[..SAMPLE_SIZE]);
        hasher.update(&data[data.len() - SAMPLE_SIZE..]);
    }
    hasher.update(&(data.len() as u64).to_le_bytes());
    format!("{:016x}", hasher.digest())
}

/// 提取结果缓存
#[derive(Debug, Default)]
pub struct ExtractionCache {
    entries: HashMap<String, Vec<ExtractedString>>,
    path: Option<PathBuf>,
    hits: usize,
    misses: usize,
}

impl ExtractionCache {
    /// 仅在内存中的缓存
    pub fn new() -> Self {
        Self::default()
    }

    /// 从 JSON 文件加载，文件不存在时返回空缓存；`save` 会写回同一文件
    pub fn load(path: &Path) -> Result<Self, EspError> {
        let entries = if path.exists() {
            let data = DefaultFileReader.read(path)?;
            serde_json::from_slice(&data)?
        } else {
            HashMap::new()
        };
        tracing::debug!("缓存 {} 含 {} 个条目", path.display(), entries.len());

        Ok(ExtractionCache {
            entries,
            path: Some(path.to_path_buf()),
            hits: 0,
            misses: 0,
        })
    }

    /// 写回加载时的文件，内存缓存直接返回
    pub fn save(&self) -> Result<(), EspError> {
        match &self.path {
            Some(path) => self.save_to(path),
            None => Ok(()),
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<(), EspError> {
        let json = serde_json::to_vec(&self.entries)?;
        DefaultFileWriter.write(&json, path)
    }

    pub fn get(&mut self, key: &str) -> Option<&[ExtractedString]> {
        match self.entries.get(key) {
            Some(strings) => {
                self.hits += 1;
                Some(strings)
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, strings: Vec<ExtractedString>) {
        self.entries.insert(key.into(), strings);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn hits(&self) -> usize {
        self.hits
    }

    pub fn misses(&self) -> usize {
        self.misses
    }
}

impl Plugin {
    /// 带缓存的字符串提取
    ///
    /// 键由插件当前内容的标识、影响结果的选项以及（本地化插件的）字符串表指纹组成。
    /// 内容标识来自重新序列化的字节，内存中的修改（替换、ESL 转换）会得到新的键。
    ///
    /// # 参数
    /// * `lookup` - 本地化插件使用的字符串表
    /// * `options` - 提取选项
    /// * `cache` - 显式传入的缓存对象
    pub fn extract_strings_cached(
        &self,
        lookup: &dyn StringLookup,
        options: &ExtractOptions,
        cache: &mut ExtractionCache,
    ) -> Result<Vec<ExtractedString>, EspError> {
        let identifier = bytes_identifier(&self.to_bytes()?);
        let options_hash = bytes_identifier(&serde_json::to_vec(options)?);
        let key = if self.is_localized() {
            format!("{}:{}:{:016x}", identifier, options_hash, lookup.fingerprint())
        } else {
            format!("{}:{}", identifier, options_hash)
        };

        if let Some(strings) = cache.get(&key) {
            tracing::debug!("缓存命中: {}", self.name());
            return Ok(strings.to_vec());
        }

        let strings = self.extract_strings_with(lookup, options);
        cache.insert(key, strings.clone());
        Ok(strings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::tests::record_bytes;
    use crate::string_file::{NoStrings, StringFileType};

    fn plugin_bytes(name: &str) -> Vec<u8> {
        let mut header = b"HEDR\x0c\x00".to_vec();
        header.extend_from_slice(&[0u8; 12]);
        let mut bytes = record_bytes(b"TES4", 0, 0, &header);

        let mut payload = b"FULL".to_vec();
        payload.extend_from_slice(&(name.len() as u16 + 1).to_le_bytes());
        payload.extend_from_slice(name.as_bytes());
        payload.push(0);
        let record = record_bytes(b"WEAP", 0, 0x800, &payload);
        bytes.extend_from_slice(b"GRUP");
        bytes.extend_from_slice(&(24 + record.len() as u32).to_le_bytes());
        bytes.extend_from_slice(b"WEAP");
        bytes.extend_from_slice(&[0u8; 12]);
        bytes.extend_from_slice(&record);
        bytes
    }

    #[test]
    fn test_identifier_samples_head_and_tail() {
        let mut large = vec![0u8; SAMPLE_SIZE * 3];
        let base = bytes_identifier(&large);

        // 中间部分不参与哈希
        large[SAMPLE_SIZE + 10] = 1;
        assert_eq!(bytes_identifier(&large), base);

        large[10] = 1;
        assert_ne!(bytes_identifier(&large), base);

        let longer = vec![0u8; SAMPLE_SIZE * 3 + 1];
        assert_ne!(bytes_identifier(&longer), base);
    }

    #[test]
    fn test_file_identifier_matches_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.esp");
        std::fs::write(&path, b"some plugin bytes").unwrap();
        assert_eq!(file_identifier(&path).unwrap(), bytes_identifier(b"some plugin bytes"));
    }

    #[test]
    fn test_cached_extraction_hits() {
        let plugin = Plugin::from_bytes("Test.esp", &plugin_bytes("Iron Sword")).unwrap();
        let options = ExtractOptions::default();
        let mut cache = ExtractionCache::new();

        let first = plugin.extract_strings_cached(&NoStrings, &options, &mut cache).unwrap();
        let second = plugin.extract_strings_cached(&NoStrings, &options, &mut cache).unwrap();
        assert_eq!(first, second);
        assert_eq!(cache.hits(), 1);
        assert_eq!(cache.misses(), 1);

        let other = Plugin::from_bytes("Test.esp", &plugin_bytes("Steel Sword")).unwrap();
        let strings = other.extract_strings_cached(&NoStrings, &options, &mut cache).unwrap();
        assert_eq!(strings[0].original_text, "Steel Sword");
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_edits_invalidate_entry() {
        let dir = tempfile::tempdir().unwrap();
        let plugin_path = dir.path().join("Test.esp");
        std::fs::write(&plugin_path, plugin_bytes("Iron Sword")).unwrap();
        let mut plugin = Plugin::parse(&plugin_path).unwrap();
        let options = ExtractOptions::default();
        let mut cache = ExtractionCache::new();

        let mut strings = plugin.extract_strings_cached(&NoStrings, &options, &mut cache).unwrap();
        strings[0].translated_text = Some("Eisenschwert".to_string());
        plugin.replace_strings(&strings).unwrap();

        // 磁盘上的文件没有变化，键仍须反映内存中的内容
        let cached = plugin.extract_strings_cached(&NoStrings, &options, &mut cache).unwrap();
        assert_eq!(cached[0].original_text, "Eisenschwert");
        assert_eq!(cache.hits(), 0);

        plugin.convert_to_light_plugin().unwrap();
        plugin.extract_strings_cached(&NoStrings, &options, &mut cache).unwrap();
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn test_localized_key_includes_tables() {
        let mut header = b"HEDR\x0c\x00".to_vec();
        header.extend_from_slice(&[0u8; 12]);
        let mut bytes = record_bytes(b"TES4", 0x80, 0, &header);
        let record = record_bytes(b"WEAP", 0, 0x800, b"FULL\x04\x00\x01\x00\x00\x00");
        bytes.extend_from_slice(b"GRUP");
        bytes.extend_from_slice(&(24 + record.len() as u32).to_le_bytes());
        bytes.extend_from_slice(b"WEAP");
        bytes.extend_from_slice(&[0u8; 12]);
        bytes.extend_from_slice(&record);
        let plugin = Plugin::from_bytes("Test.esp", &bytes).unwrap();

        let english: HashMap<(StringFileType, u32), String> =
            HashMap::from([((StringFileType::STRINGS, 1), "Iron Sword".to_string())]);
        let german: HashMap<(StringFileType, u32), String> =
            HashMap::from([((StringFileType::STRINGS, 1), "Eisenschwert".to_string())]);
        let options = ExtractOptions::default();
        let mut cache = ExtractionCache::new();

        let first = plugin.extract_strings_cached(&english, &options, &mut cache).unwrap();
        let second = plugin.extract_strings_cached(&german, &options, &mut cache).unwrap();
        assert_eq!(first[0].original_text, "Iron Sword");
        assert_eq!(second[0].original_text, "Eisenschwert");
        assert_eq!(cache.hits(), 0);

        plugin.extract_strings_cached(&german.clone(), &options, &mut cache).unwrap();
        assert_eq!(cache.hits(), 1);
    }

    #[test]
    fn test_persistence() {
        let dir = tempfile::tempdir().unwrap();
        let cache_path = dir.path().join("cache").join("strings.json");
        let plugin_path = dir.path().join("Test.esp");
        std::fs::write(&plugin_path, plugin_bytes("Iron Sword")).unwrap();
        let plugin = Plugin::parse(&plugin_path).unwrap();

        let mut cache = ExtractionCache::load(&cache_path).unwrap();
        assert!(cache.is_empty());
        plugin
            .extract_strings_cached(&NoStrings, &ExtractOptions::default(), &mut cache)
            .unwrap();
        cache.save().unwrap();

        let mut reloaded = ExtractionCache::load(&cache_path).unwrap();
        assert_eq!(reloaded.len(), 1);
        let strings = plugin
            .extract_strings_cached(&NoStrings, &ExtractOptions::default(), &mut reloaded)
            .unwrap();
        assert_eq!(reloaded.hits(), 1);
        assert_eq!(strings[0].original_text, "Iron Sword");
    }
}
