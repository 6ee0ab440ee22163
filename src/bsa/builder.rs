//! BSA 归档生成
//!
//! 按名称哈希排序文件夹与文件，布局：文件头、文件夹记录、文件记录块、文件名块、文件数据。

use std::collections::BTreeMap;

use super::compression::compress;
use super::hash::name_hash;
use super::header::{ArchiveFlags, ArchiveHeader, ArchiveVersion, FileFlags, HEADER_SIZE};
use super::records::{encode_name, FileRecord, FileRecordBlock, FolderRecord, COMPRESSION_TOGGLE_BIT};
use super::split_path;
use crate::datatypes::{write_u32, write_u8};
use crate::utils::EspError;

struct PendingFile {
    name: String,
    data: Vec<u8>,
    /// None 表示沿用归档默认值
    compress: Option<bool>,
}

/// BSA 归档生成器
pub struct ArchiveBuilder {
    version: ArchiveVersion,
    flags: ArchiveFlags,
    file_flags: FileFlags,
    folders: BTreeMap<String, Vec<PendingFile>>,
}

impl ArchiveBuilder {
    pub fn new(version: ArchiveVersion) -> Self {
        ArchiveBuilder {
            version,
            flags: ArchiveFlags::INCLUDE_DIRECTORY_NAMES | ArchiveFlags::INCLUDE_FILE_NAMES,
            file_flags: FileFlags::empty(),
            folders: BTreeMap::new(),
        }
    }

    /// 设置归档级压缩标志（单个文件可通过反转位覆盖）
    pub fn compressed(mut self, compressed: bool) -> Self {
        self.flags.set(ArchiveFlags::COMPRESSED_ARCHIVE, compressed);
        self
    }

    pub fn embed_file_names(mut self, embed: bool) -> Self {
        self.flags.set(ArchiveFlags::EMBED_FILE_NAMES, embed);
        self
    }

    pub fn file_flags(mut self, file_flags: FileFlags) -> Self {
        self.file_flags = file_flags;
        self
    }

    /// 添加文件，压缩方式沿用归档默认值
    pub fn add_file(&mut self, path: &str, data: Vec<u8>) -> &mut Self {
        self.push(path, data, None)
    }

    /// 添加文件并显式指定是否压缩
    pub fn add_file_with_compression(&mut self, path: &str, data: Vec<u8>, compress: bool) -> &mut Self {
        self.push(path, data, Some(compress))
    }

    fn push(&mut self, path: &str, data: Vec<u8>, compress: Option<bool>) -> &mut Self {
        let normalized = path.to_lowercase().replace('\\', "/");
        let (folder, name) = split_path(normalized.trim_start_matches('/'));
        self.folders
            .entry(folder)
            .or_default()
            .push(PendingFile { name, data, compress });
        self
    }

    /// 生成归档字节
    pub fn build(&self) -> Result<Vec<u8>, EspError> {
        let archive_compressed = self.flags.contains(ArchiveFlags::COMPRESSED_ARCHIVE);
        let embed_names = self.flags.contains(ArchiveFlags::EMBED_FILE_NAMES)
            && self.version != ArchiveVersion::Oblivion;

        // 按哈希排序
        let mut folders: Vec<(u64, String, Vec<&PendingFile>)> = self
            .folders
            .iter()
            .map(|(folder, files)| {
                let mut files: Vec<&PendingFile> = files.iter().collect();
                files.sort_by_key(|f| name_hash(&f.name));
                (name_hash(&folder.replace('/', "\\")), folder.replace('/', "\\"), files)
            })
            .collect();
        folders.sort_by_key(|(hash, _, _)| *hash);

        let file_count: usize = folders.iter().map(|(_, _, files)| files.len()).sum();
        let total_folder_name_length: usize =
            folders.iter().map(|(_, name, _)| encode_name(name).len() + 1).sum();
        let file_names: Vec<Vec<u8>> = folders
            .iter()
            .flat_map(|(_, _, files)| files.iter().map(|f| encode_name(&f.name)))
            .collect();
        let total_file_name_length: usize = file_names.iter().map(|n| n.len() + 1).sum();

        // 各区段起始位置
        let folder_records_size = folders.len() * self.version.folder_record_size();
        let file_blocks_start = HEADER_SIZE as usize + folder_records_size;
        let file_blocks_size = total_folder_name_length + folders.len() + 16 * file_count;
        let data_start = file_blocks_start + file_blocks_size + total_file_name_length;

        // 数据区
        let mut data_section = Vec::new();
        let mut blocks = Vec::with_capacity(folders.len());
        for (_, folder_name, files) in &folders {
            let mut records = Vec::with_capacity(files.len());
            for file in files {
                let offset = data_start + data_section.len();
                let start = data_section.len();

                if embed_names {
                    let full_path = if folder_name.is_empty() {
                        file.name.clone()
                    } else {
                        format!("{}\\{}", folder_name, file.name)
                    };
                    let bytes = encode_name(&full_path);
                    let length = u8::try_from(bytes.len())
                        .map_err(|_| EspError::corrupt("embedded name", "路径超过 255 字节"))?;
                    write_u8(&mut data_section, length)?;
                    data_section.extend_from_slice(&bytes);
                }

                let compress_file = file.compress.unwrap_or(archive_compressed);
                if compress_file {
                    write_u32(&mut data_section, file.data.len() as u32)?;
                    data_section.extend_from_slice(&compress(self.version, &file.data)?);
                } else {
                    data_section.extend_from_slice(&file.data);
                }

                let mut raw_size = (data_section.len() - start) as u32;
                if compress_file != archive_compressed {
                    raw_size |= COMPRESSION_TOGGLE_BIT;
                }
                records.push(FileRecord {
                    name_hash: name_hash(&file.name),
                    raw_size,
                    offset: u32::try_from(offset)
                        .map_err(|_| EspError::corrupt("file record", "归档超过 4 GiB"))?,
                });
            }
            blocks.push(FileRecordBlock {
                name: folder_name.clone(),
                files: records,
            });
        }

        let header = ArchiveHeader {
            version: self.version,
            header_offset: HEADER_SIZE,
            archive_flags: self.flags,
            folder_count: folders.len() as u32,
            file_count: file_count as u32,
            total_folder_name_length: total_folder_name_length as u32,
            total_file_name_length: total_file_name_length as u32,
            file_flags: self.file_flags,
            padding: 0,
        };

        let mut buffer = Vec::with_capacity(data_start + data_section.len());
        header.write(&mut buffer)?;

        // 文件夹记录的偏移量按惯例加上文件名块总长
        let mut block_offset = file_blocks_start;
        for ((hash, name, files), block) in folders.iter().zip(&blocks) {
            FolderRecord {
                name_hash: *hash,
                file_count: files.len() as u32,
                padding: 0,
                offset: (block_offset + total_file_name_length) as u64,
            }
            .write(&mut buffer, self.version)?;
            block_offset += encode_name(name).len() + 2 + 16 * block.files.len();
        }

        for block in &blocks {
            block.write(&mut buffer, true)?;
        }
        for name in &file_names {
            buffer.extend_from_slice(name);
            buffer.push(0);
        }
        debug_assert_eq!(buffer.len(), data_start);
        buffer.extend_from_slice(&data_section);

        tracing::debug!(
            "生成归档: {} 个文件夹, {} 个文件, {} 字节",
            folders.len(),
            file_count,
            buffer.len()
        );
        Ok(buffer)
    }
}
