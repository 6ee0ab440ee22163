//! BSA (Bethesda Archive) 文件访问模块
//!
//! 提供对 TES4 风格 BSA 归档（Oblivion / Fallout 3 / NV / Skyrim LE / Skyrim SE）的读取支持：
//! 文件头、文件夹记录、文件记录块、文件名块；按逻辑路径定位文件并按需解压。
//!
//! 逻辑路径统一为小写、`/` 分隔，例如 `"interface/translations/mymod_english.txt"`。

mod builder;
mod compression;
mod glob;
mod hash;
mod header;
mod records;
mod strings_provider;

use std::collections::HashMap;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use rayon::prelude::*;

use crate::datatypes::{read_u32, read_u8, remaining};
use crate::io::{DefaultFileReader, DefaultFileWriter, FileBytes, FileReader, FileWriter};
use crate::utils::EspError;

pub use builder::ArchiveBuilder;
pub use glob::glob_match;
pub use hash::name_hash;
pub use header::{
    ArchiveFlags, ArchiveHeader, ArchiveVersion, FileFlags, ARCHIVE_FLAG_NAMES, FILE_FLAG_NAMES,
};
pub use records::{FileRecord, FileRecordBlock, FolderRecord};
pub use strings_provider::BsaStringsProvider;

/// 归档中的一个文件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// 规范化后的逻辑路径
    pub path: String,
    pub name_hash: u64,
    /// 数据块大小（含内嵌文件名与解压长度前缀）
    pub size: u32,
    pub offset: u32,
    pub compressed: bool,
}

/// 批量解压结果
#[derive(Debug, Default)]
pub struct ExtractReport {
    pub extracted: Vec<PathBuf>,
    pub failed: Vec<(String, EspError)>,
}

/// BSA 归档
///
/// 持有整个归档的字节来源（内存映射或内存缓冲），解压时只做切片，不移动任何共享游标。
pub struct Archive {
    path: Option<PathBuf>,
    data: FileBytes,
    header: ArchiveHeader,
    folders: Vec<FolderRecord>,
    entries: Vec<ArchiveEntry>,
    /// 逻辑路径 -> entries 下标
    index: HashMap<String, usize>,
}

impl std::fmt::Debug for Archive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Archive")
            .field("path", &self.path)
            .field("header", &self.header)
            .field("files", &self.entries.len())
            .finish()
    }
}

impl Archive {
    /// 打开一个 TES4 风格的 BSA 归档
    ///
    /// # 参数
    /// * `path` - 归档路径，文件以内存映射方式读取
    ///
    /// # 错误
    /// 文件不存在、魔数或版本不受支持、目录结构越界时返回错误
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, EspError> {
        Self::open_with_reader(path, &DefaultFileReader)
    }

    /// 使用自定义 Reader 打开归档
    pub fn open_with_reader<P: AsRef<Path>>(path: P, reader: &dyn FileReader) -> Result<Self, EspError> {
        let path = path.as_ref();
        let data = reader.read(path)?;
        let mut archive = Self::parse(data)?;
        archive.path = Some(path.to_path_buf());
        tracing::debug!("已打开归档 {}: {} 个文件", path.display(), archive.entries.len());
        if tracing::enabled!(tracing::Level::DEBUG) {
            for mismatch in archive.verify_hashes() {
                tracing::debug!("名称哈希不一致: {}", mismatch);
            }
        }
        Ok(archive)
    }

    /// 从内存字节解析归档
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, EspError> {
        Self::parse(FileBytes::from(bytes))
    }

    fn parse(data: FileBytes) -> Result<Self, EspError> {
        let (header, folders, entries) = {
            let mut cursor = Cursor::new(&data[..]);
            let header = ArchiveHeader::parse(&mut cursor)?;

            let folder_bytes = (header.folder_count as usize)
                .saturating_mul(header.version.folder_record_size());
            if folder_bytes > remaining(&cursor) {
                return Err(EspError::corrupt(
                    "folder records",
                    format!("声明 {} 个文件夹，数据不足", header.folder_count),
                ));
            }
            let folders = (0..header.folder_count)
                .map(|_| FolderRecord::parse(&mut cursor, header.version))
                .collect::<Result<Vec<_>, _>>()?;

            let has_folder_names = header
                .archive_flags
                .contains(ArchiveFlags::INCLUDE_DIRECTORY_NAMES);
            let blocks = folders
                .iter()
                .map(|folder| FileRecordBlock::parse(&mut cursor, folder.file_count, has_folder_names))
                .collect::<Result<Vec<_>, _>>()?;

            let declared: usize = blocks.iter().map(|b| b.files.len()).sum();
            if declared != header.file_count as usize {
                return Err(EspError::corrupt(
                    "file records",
                    format!("文件头声明 {} 个文件，目录中有 {} 个", header.file_count, declared),
                ));
            }

            let names = if header.archive_flags.contains(ArchiveFlags::INCLUDE_FILE_NAMES) {
                Some(records::parse_file_name_block(&mut cursor, &header)?)
            } else {
                None
            };

            let entries = Self::build_entries(&header, &blocks, names.as_deref())?;
            (header, folders, entries)
        };

        let mut index = HashMap::with_capacity(entries.len());
        for (i, entry) in entries.iter().enumerate() {
            if index.insert(entry.path.clone(), i).is_some() {
                return Err(EspError::corrupt("file records", format!("重复的路径: {}", entry.path)));
            }
        }

        Ok(Archive {
            path: None,
            data,
            header,
            folders,
            entries,
            index,
        })
    }

    /// 按文件夹/文件顺序消费文件名，拼接完整路径
    fn build_entries(
        header: &ArchiveHeader,
        blocks: &[FileRecordBlock],
        names: Option<&[String]>,
    ) -> Result<Vec<ArchiveEntry>, EspError> {
        let archive_compressed = header.is_compressed();
        let mut entries = Vec::with_capacity(header.file_count as usize);
        let mut name_index = 0usize;

        for block in blocks {
            for file in &block.files {
                let file_name = match names {
                    Some(names) => names[name_index].clone(),
                    None => format!("{:016x}", file.name_hash),
                };
                name_index += 1;

                let logical_path = if block.name.is_empty() {
                    file_name
                } else {
                    format!("{}/{}", block.name, file_name)
                };

                entries.push(ArchiveEntry {
                    path: normalize_path(&logical_path),
                    name_hash: file.name_hash,
                    size: file.size(),
                    offset: file.offset,
                    compressed: file.is_compressed(archive_compressed),
                });
            }
        }

        Ok(entries)
    }

    pub fn header(&self) -> &ArchiveHeader {
        &self.header
    }

    pub fn folders(&self) -> &[FolderRecord] {
        &self.folders
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn entries(&self) -> &[ArchiveEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 返回归档中所有文件的逻辑路径
    ///
    /// # 返回
    /// 小写、以 `/` 分隔、按字典序排列的路径列表
    pub fn list_paths(&self) -> Vec<String> {
        let mut files: Vec<String> = self.entries.iter().map(|e| e.path.clone()).collect();
        files.sort();
        files
    }

    /// 路径是否存在（不区分大小写）
    pub fn contains(&self, logical_path: &str) -> bool {
        self.index.contains_key(&normalize_path(logical_path))
    }

    pub fn entry(&self, logical_path: &str) -> Option<&ArchiveEntry> {
        self.index
            .get(&normalize_path(logical_path))
            .map(|&i| &self.entries[i])
    }

    /// 通配符查找，默认不区分大小写
    ///
    /// # 参数
    /// * `pattern` - `*` 和 `?` 只匹配单个路径段内的字符，`**` 可跨越目录
    ///
    /// # 返回
    /// 匹配的逻辑路径，顺序与 `list_paths` 一致
    pub fn glob(&self, pattern: &str) -> Vec<String> {
        self.glob_with_case(pattern, false)
    }

    pub fn glob_with_case(&self, pattern: &str, case_sensitive: bool) -> Vec<String> {
        let mut matches: Vec<String> = self
            .entries
            .iter()
            .filter(|e| glob_match(pattern, &e.path, case_sensitive))
            .map(|e| e.path.clone())
            .collect();
        matches.sort();
        matches
    }

    /// 提取指定逻辑路径的文件内容
    ///
    /// # 参数
    /// * `logical_path` - 逻辑路径，不区分大小写，允许使用 `/` 或 `\`
    ///
    /// # 返回
    /// 解压后的完整内容；路径不存在时返回 `FileNotFound`
    pub fn extract_to_memory(&self, logical_path: &str) -> Result<Vec<u8>, EspError> {
        let entry = self
            .entry(logical_path)
            .ok_or_else(|| EspError::FileNotFound(format!("文件在归档中不存在: {}", logical_path)))?;
        self.read_entry(entry)
    }

    fn read_entry(&self, entry: &ArchiveEntry) -> Result<Vec<u8>, EspError> {
        let start = entry.offset as usize;
        let end = start
            .checked_add(entry.size as usize)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| {
                EspError::corrupt(
                    entry.path.clone(),
                    format!("数据块 {}+{} 超出归档长度 {}", start, entry.size, self.data.len()),
                )
            })?;

        let mut cursor = Cursor::new(&self.data[start..end]);

        // Oblivion 的 0x100 位含义不同
        if self.header.embeds_file_names() && self.header.version != ArchiveVersion::Oblivion {
            let length = read_u8(&mut cursor)? as usize;
            crate::datatypes::skip(&mut cursor, length)?;
        }

        if entry.compressed {
            let original_size = read_u32(&mut cursor)? as usize;
            let payload = &cursor.get_ref()[cursor.position() as usize..];
            compression::decompress(self.header.version, payload, original_size)
        } else {
            let payload = &cursor.get_ref()[cursor.position() as usize..];
            Ok(payload.to_vec())
        }
    }

    /// 提取文件到目标目录，保留逻辑路径结构
    ///
    /// # 参数
    /// * `logical_path` - 要提取的逻辑路径
    /// * `destination` - 目标目录，不存在的子目录会被创建
    ///
    /// # 返回
    /// 写出的文件路径
    pub fn extract(&self, logical_path: &str, destination: &Path) -> Result<PathBuf, EspError> {
        self.extract_with_writer(logical_path, destination, &DefaultFileWriter)
    }

    pub fn extract_with_writer(
        &self,
        logical_path: &str,
        destination: &Path,
        writer: &dyn FileWriter,
    ) -> Result<PathBuf, EspError> {
        let entry = self
            .entry(logical_path)
            .ok_or_else(|| EspError::FileNotFound(format!("文件在归档中不存在: {}", logical_path)))?;
        let data = self.read_entry(entry)?;
        let target = destination.join(&entry.path);
        writer.write(&data, &target)?;
        Ok(target)
    }

    /// 并行提取所有文件，单个文件失败不会中断其他文件
    ///
    /// # 返回
    /// `ExtractReport`，分别列出成功写出的路径和失败的逻辑路径
    pub fn extract_all(&self, destination: &Path) -> ExtractReport {
        let results: Vec<(String, Result<PathBuf, EspError>)> = self
            .entries
            .par_iter()
            .map(|entry| {
                let result = self.read_entry(entry).and_then(|data| {
                    let target = destination.join(&entry.path);
                    DefaultFileWriter.write(&data, &target)?;
                    Ok(target)
                });
                (entry.path.clone(), result)
            })
            .collect();

        let mut report = ExtractReport::default();
        for (path, result) in results {
            match result {
                Ok(target) => report.extracted.push(target),
                Err(e) => {
                    tracing::warn!("提取 {} 失败: {}", path, e);
                    report.failed.push((path, e));
                }
            }
        }
        report
    }

    /// 检查记录的名称哈希与路径是否一致，返回不一致的路径
    pub fn verify_hashes(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter(|e| {
                let (_, file_name) = split_path(&e.path);
                name_hash(&file_name) != e.name_hash
            })
            .map(|e| e.path.clone())
            .collect()
    }
}

/// 规范化路径：小写 + 统一为 `/` 分隔符 + 移除前导 `/`
pub fn normalize_path(path: &str) -> String {
    path.to_lowercase()
        .replace('\\', "/")
        .trim_start_matches('/')
        .to_string()
}

/// 把逻辑路径拆分为 (dir, file)
///
/// 如果没有 '/'，dir 为空字符串
pub(crate) fn split_path(path: &str) -> (String, String) {
    match path.rfind('/') {
        Some(pos) => (path[..pos].to_string(), path[pos + 1..].to_string()),
        None => (String::new(), path.to_string()),
    }
}
