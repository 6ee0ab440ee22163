use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use crate::utils::{create_backup, EspError};

use super::file::StringFile;
use super::io::find_string_file;
use super::{fingerprint_entries, StringEntry, StringFileType, StringLookup};

/// 一个插件某种语言的三类字符串表
#[derive(Debug, Clone)]
pub struct StringFileSet {
    pub files: HashMap<StringFileType, StringFile>,
    pub plugin_name: String,
    pub language: String,
}

impl StringFileSet {
    pub fn new(plugin_name: impl Into<String>, language: impl Into<String>) -> Self {
        StringFileSet {
            files: HashMap::new(),
            plugin_name: plugin_name.into(),
            language: language.into(),
        }
    }

    /// 从内存字节创建
    pub fn from_memory(
        files_data: HashMap<StringFileType, &[u8]>,
        plugin_name: &str,
        language: &str,
    ) -> Result<Self, EspError> {
        let mut set = StringFileSet::new(plugin_name, language);
        for (file_type, data) in files_data {
            let file = StringFile::from_bytes(data, plugin_name, language, file_type)?;
            set.files.insert(file_type, file);
        }
        Ok(set)
    }

    /// 加载目录中的字符串表，文件名大小写不敏感；缺失的类型跳过
    pub fn load_from_directory(directory: &Path, plugin_name: &str, language: &str) -> Result<Self, EspError> {
        let mut set = StringFileSet::new(plugin_name, language);

        for file_type in StringFileType::ALL {
            match find_string_file(directory, plugin_name, language, file_type) {
                Some(path) => {
                    let mut file = StringFile::open(&path)?;
                    // 文件名大小写可能与请求不同
                    file.plugin_name = plugin_name.to_string();
                    file.language = language.to_string();
                    set.files.insert(file_type, file);
                }
                None => tracing::debug!(
                    "未找到 {}_{}.{}，跳过",
                    plugin_name,
                    language,
                    file_type.to_extension()
                ),
            }
        }

        Ok(set)
    }

    pub fn get_file(&self, file_type: StringFileType) -> Option<&StringFile> {
        self.files.get(&file_type)
    }

    pub fn get_file_mut(&mut self, file_type: StringFileType) -> Option<&mut StringFile> {
        self.files.get_mut(&file_type)
    }

    pub fn add_file(&mut self, file_type: StringFileType, file: StringFile) {
        self.files.insert(file_type, file);
    }

    pub fn get_string(&self, file_type: StringFileType, id: u32) -> Option<&StringEntry> {
        self.files.get(&file_type)?.get_string(id)
    }

    pub fn total_count(&self) -> usize {
        self.files.values().map(StringFile::count).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.files.values().all(StringFile::is_empty)
    }

    /// 三类文件中出现过的全部 ID（去重、排序）
    pub fn get_all_string_ids(&self) -> Vec<u32> {
        self.files
            .values()
            .flat_map(|f| f.entries.keys().copied())
            .collect::<BTreeSet<u32>>()
            .into_iter()
            .collect()
    }

    pub fn update_string(&mut self, file_type: StringFileType, id: u32, content: impl Into<String>) -> Result<(), EspError> {
        self.files
            .get_mut(&file_type)
            .ok_or_else(|| EspError::FileNotFound(format!("未加载 {} 文件", file_type.to_extension())))?
            .update_string(id, content)
    }

    /// 批量应用翻译，返回更新的数量
    ///
    /// 先检查全部 (类型, ID) 是否存在；任一缺失时返回 `FileNotFound`，不修改任何条目。
    pub fn apply_translations(&mut self, translations: &HashMap<(StringFileType, u32), String>) -> Result<usize, EspError> {
        let mut missing: Vec<(StringFileType, u32)> = translations
            .keys()
            .filter(|(file_type, id)| self.get_string(*file_type, *id).is_none())
            .copied()
            .collect();
        if !missing.is_empty() {
            missing.sort_by_key(|&(file_type, id)| (file_type.to_extension(), id));
            let listed: Vec<String> = missing
                .iter()
                .map(|(file_type, id)| format!("{} {:08X}", file_type.to_extension(), id))
                .collect();
            return Err(EspError::FileNotFound(format!(
                "{} 条翻译找不到对应字符串: {}",
                missing.len(),
                listed.join(", ")
            )));
        }

        for ((file_type, id), content) in translations {
            self.update_string(*file_type, *id, content.clone())?;
        }
        Ok(translations.len())
    }

    /// 写出全部文件到目录，已存在的文件先备份
    pub fn write_all(&self, directory: &Path) -> Result<Vec<PathBuf>, EspError> {
        let mut written = Vec::with_capacity(self.files.len());
        for file_type in StringFileType::ALL {
            let Some(file) = self.files.get(&file_type) else {
                continue;
            };
            let path = directory.join(format!(
                "{}_{}.{}",
                self.plugin_name,
                self.language,
                file_type.to_extension()
            ));

            if path.exists() {
                create_backup(&path)?;
            }
            file.write_to_file(&path)?;
            written.push(path);
        }
        Ok(written)
    }
}

impl StringLookup for StringFileSet {
    fn lookup(&self, file_type: StringFileType, id: u32) -> Option<&str> {
        self.get_string(file_type, id).map(|entry| entry.content.as_str())
    }

    fn fingerprint(&self) -> u64 {
        fingerprint_entries(self.files.iter().flat_map(|(&file_type, file)| {
            file.entries
                .values()
                .map(move |entry| (file_type, entry.id, entry.content.as_str()))
        }))
    }
}
