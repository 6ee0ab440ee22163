use std::collections::HashMap;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use crate::datatypes::{read_u32, write_u32, RawString};
use crate::io::{DefaultFileReader, DefaultFileWriter, FileReader, FileWriter};
use crate::utils::EspError;

use super::io::parse_filename;
use super::{StringEntry, StringFileType};

const HEADER_SIZE: usize = 8;
const DIRECTORY_ENTRY_SIZE: usize = 8;

/// 单个字符串表文件
#[derive(Debug, Clone)]
pub struct StringFile {
    /// 来源路径，内存加载时为 `<memory>:...`
    pub path: PathBuf,
    pub file_type: StringFileType,
    pub language: String,
    pub plugin_name: String,
    pub entries: HashMap<u32, StringEntry>,
}

impl StringFile {
    /// 从磁盘加载，文件名需符合 `Plugin_language.EXT`
    pub fn open(path: &Path) -> Result<Self, EspError> {
        Self::open_with_reader(path, &DefaultFileReader)
    }

    pub fn open_with_reader(path: &Path, reader: &dyn FileReader) -> Result<Self, EspError> {
        let (plugin_name, language, file_type) = parse_filename(path)?;
        let data = reader.read(path)?;
        let entries = Self::parse_entries(&data, file_type)?;

        tracing::debug!("加载字符串表 {}: {} 条", path.display(), entries.len());

        Ok(StringFile {
            path: path.to_path_buf(),
            file_type,
            language,
            plugin_name,
            entries,
        })
    }

    /// 从内存字节创建
    pub fn from_bytes(
        data: &[u8],
        plugin_name: impl Into<String>,
        language: impl Into<String>,
        file_type: StringFileType,
    ) -> Result<Self, EspError> {
        let plugin_name = plugin_name.into();
        let language = language.into();
        let entries = Self::parse_entries(data, file_type)?;

        Ok(StringFile {
            path: PathBuf::from(format!(
                "<memory>:{}_{}.{}",
                plugin_name,
                language,
                file_type.to_extension()
            )),
            file_type,
            language,
            plugin_name,
            entries,
        })
    }

    /// 解析目录与数据区
    pub(crate) fn parse_entries(
        data: &[u8],
        file_type: StringFileType,
    ) -> Result<HashMap<u32, StringEntry>, EspError> {
        if data.len() < HEADER_SIZE {
            return Err(EspError::corrupt("string table", "文件头不完整"));
        }

        let mut cursor = Cursor::new(data);
        let count = read_u32(&mut cursor)? as usize;
        let data_size = read_u32(&mut cursor)? as usize;

        let data_offset = data
            .len()
            .checked_sub(data_size)
            .ok_or_else(|| EspError::corrupt("string table", format!("数据区大小 {} 超过文件长度", data_size)))?;
        let directory_end = count
            .checked_mul(DIRECTORY_ENTRY_SIZE)
            .and_then(|size| size.checked_add(HEADER_SIZE))
            .filter(|&end| end <= data_offset)
            .ok_or_else(|| EspError::corrupt("string table", format!("目录 ({} 条) 与数据区重叠", count)))?;
        debug_assert!(directory_end <= data.len());

        let mut entries = HashMap::with_capacity(count);
        for _ in 0..count {
            let id = read_u32(&mut cursor)?;
            let relative_offset = read_u32(&mut cursor)?;

            // 读取条目后恢复游标到目录
            let directory_position = cursor.position();
            cursor.set_position((data_offset + relative_offset as usize) as u64);
            let raw = Self::read_entry(&mut cursor, file_type)?;
            cursor.set_position(directory_position);

            entries.insert(
                id,
                StringEntry {
                    id,
                    relative_offset,
                    content: raw.content,
                    encoding: raw.encoding,
                },
            );
        }

        Ok(entries)
    }

    fn read_entry(cursor: &mut Cursor<&[u8]>, file_type: StringFileType) -> Result<RawString, EspError> {
        if cursor.position() as usize >= cursor.get_ref().len() {
            return Err(EspError::corrupt("string table", format!("条目偏移 {} 越界", cursor.position())));
        }

        if file_type.has_length_prefix() {
            let length = read_u32(cursor)? as usize;
            let start = cursor.position() as usize;
            let bytes = cursor
                .get_ref()
                .get(start..start + length)
                .ok_or_else(|| EspError::corrupt("string table", format!("条目长度 {} 越界", length)))?;
            Ok(RawString::parse_zstring(bytes))
        } else {
            RawString::read_zstring(cursor)
        }
    }

    pub fn get_string(&self, id: u32) -> Option<&StringEntry> {
        self.entries.get(&id)
    }

    /// 已排序的全部 ID
    pub fn get_string_ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.entries.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn count(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 更新已有字符串，ID 不存在时返回 FileNotFound
    pub fn update_string(&mut self, id: u32, content: impl Into<String>) -> Result<(), EspError> {
        let entry = self
            .entries
            .get_mut(&id)
            .ok_or_else(|| EspError::FileNotFound(format!("字符串 ID {:08X} 不存在", id)))?;
        entry.content = content.into();
        Ok(())
    }

    /// 添加或覆盖字符串
    pub fn insert_string(&mut self, id: u32, content: impl Into<String>) {
        self.entries.insert(id, StringEntry::new(id, content));
    }

    pub fn remove_string(&mut self, id: u32) -> Option<StringEntry> {
        self.entries.remove(&id)
    }

    /// 重建二进制数据，条目按 ID 排序写出
    ///
    /// 文本沿用原编码；原编码无法表示新文本时改用 UTF-8。
    pub fn to_bytes(&self) -> Result<Vec<u8>, EspError> {
        let ids = self.get_string_ids();

        let mut directory = Vec::with_capacity(ids.len() * DIRECTORY_ENTRY_SIZE);
        let mut data_section = Vec::new();
        for id in &ids {
            let entry = &self.entries[id];
            write_u32(&mut directory, *id)?;
            write_u32(&mut directory, data_section.len() as u32)?;

            let mut bytes = encode_entry(entry)?;
            bytes.push(0);
            if self.file_type.has_length_prefix() {
                // 长度包含结尾 null
                write_u32(&mut data_section, bytes.len() as u32)?;
            }
            data_section.extend_from_slice(&bytes);
        }

        let mut buffer = Vec::with_capacity(HEADER_SIZE + directory.len() + data_section.len());
        write_u32(&mut buffer, ids.len() as u32)?;
        write_u32(&mut buffer, data_section.len() as u32)?;
        buffer.extend_from_slice(&directory);
        buffer.extend_from_slice(&data_section);
        Ok(buffer)
    }

    pub fn write_to_file(&self, path: &Path) -> Result<(), EspError> {
        self.write_with_writer(path, &DefaultFileWriter)
    }

    pub fn write_with_writer(&self, path: &Path, writer: &dyn FileWriter) -> Result<(), EspError> {
        writer.write(&self.to_bytes()?, path)?;
        tracing::info!("已写入字符串表 {} ({} 条)", path.display(), self.count());
        Ok(())
    }
}

fn encode_entry(entry: &StringEntry) -> Result<Vec<u8>, EspError> {
    match RawString::new(entry.content.as_str(), entry.encoding.as_str()).encode() {
        Ok(bytes) => Ok(bytes),
        Err(EspError::EncodingFailure(reason)) => {
            tracing::debug!("字符串 {:08X} 改用 UTF-8: {}", entry.id, reason);
            Ok(entry.content.as_bytes().to_vec())
        }
        Err(e) => Err(e),
    }
}
