use std::borrow::Cow;
use std::io::{Cursor, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::datatypes::{
    read_bytes, read_decompressed, read_tag, read_u16, read_u32, remaining, write_u16, write_u32, RawString,
    RecordFlags,
};
use crate::special_records::SpecialRecordHandler;
use crate::string_routes::StringRouter;
use crate::subrecord::{Subrecord, SubrecordKind};
use crate::utils::EspError;

/// 记录头长度
pub const RECORD_HEADER_SIZE: usize = 24;

/// 记录结构
#[derive(Debug, Clone)]
pub struct Record {
    pub record_type: [u8; 4],
    pub flags: RecordFlags,
    pub form_id: u32,
    pub timestamp: u16,
    pub version_control_info: u16,
    pub internal_version: u16,
    pub unknown: u16,
    pub subrecords: Vec<Subrecord>,
    /// 子记录之后的 NULL 填充
    pub padding: Vec<u8>,
    /// 无法解析的已删除/忽略记录的数据，原样写回；能解析的照常提取字符串
    pub opaque: Option<Vec<u8>>,
    /// 压缩记录的原始压缩字节
    original_compressed: Option<Vec<u8>>,
    modified: bool,
}

impl Record {
    /// 解析记录，压缩记录先解压再解析子记录
    pub fn parse(cursor: &mut Cursor<&[u8]>, router: &dyn StringRouter) -> Result<Self, EspError> {
        if remaining(cursor) < RECORD_HEADER_SIZE {
            return Err(EspError::corrupt(
                format!("record @0x{:X}", cursor.position()),
                "记录头不完整",
            ));
        }

        let record_type = read_tag(cursor)?;
        let data_size = read_u32(cursor)?;
        let flags = RecordFlags::from_bits_retain(read_u32(cursor)?);
        let form_id = read_u32(cursor)?;
        let timestamp = read_u16(cursor)?;
        let version_control_info = read_u16(cursor)?;
        let internal_version = read_u16(cursor)?;
        let unknown = read_u16(cursor)?;

        let type_name = String::from_utf8_lossy(&record_type).into_owned();
        let data = read_bytes(cursor, data_size as usize).map_err(|_| {
            EspError::corrupt(
                format!("{} [{:08X}]", type_name, form_id),
                format!("数据长度 {} 超出剩余字节", data_size),
            )
        })?;

        let mut record = Record {
            record_type,
            flags,
            form_id,
            timestamp,
            version_control_info,
            internal_version,
            unknown,
            subrecords: Vec::new(),
            padding: Vec::new(),
            opaque: None,
            original_compressed: None,
            modified: false,
        };

        let context = format!("{} [{:08X}]", type_name, form_id);
        match Self::parse_payload(&data, flags, &type_name, router) {
            Ok((subrecords, padding)) => {
                record.subrecords = subrecords;
                record.padding = padding;
                if flags.contains(RecordFlags::COMPRESSED) {
                    record.original_compressed = Some(data);
                }
            }
            // 已删除/忽略的记录数据常常不完整，解析失败时原样保留
            Err(e) if flags.intersects(RecordFlags::DELETED | RecordFlags::IGNORED) => {
                tracing::debug!("{} 已删除或忽略，数据无法解析，原样保留: {}", context, e);
                record.opaque = Some(data);
            }
            Err(EspError::CorruptFormat { message, .. }) => return Err(EspError::corrupt(context, message)),
            Err(e) => return Err(e),
        }

        Ok(record)
    }

    /// 解压（如需要）并解析数据区，分配特殊索引
    fn parse_payload(
        data: &[u8],
        flags: RecordFlags,
        record_type: &str,
        router: &dyn StringRouter,
    ) -> Result<(Vec<Subrecord>, Vec<u8>), EspError> {
        let decompressed;
        let payload = if flags.contains(RecordFlags::COMPRESSED) {
            decompressed = decompress_record(data)?;
            decompressed.as_slice()
        } else {
            data
        };

        let (mut subrecords, padding) = Self::parse_subrecords(payload, record_type, router)?;
        SpecialRecordHandler::assign_indices(record_type, &mut subrecords);
        Ok((subrecords, padding))
    }

    /// 解析子记录，末尾不足一个子记录头的 NULL 字节视为填充
    fn parse_subrecords(
        data: &[u8],
        record_type: &str,
        router: &dyn StringRouter,
    ) -> Result<(Vec<Subrecord>, Vec<u8>), EspError> {
        let mut subrecords = Vec::new();
        let mut cursor = Cursor::new(data);

        while remaining(&cursor) > 0 {
            if remaining(&cursor) < 6 {
                let tail = &data[cursor.position() as usize..];
                if tail.iter().all(|&b| b == 0) {
                    return Ok((subrecords, tail.to_vec()));
                }
                return Err(EspError::corrupt(
                    record_type,
                    format!("记录末尾有 {} 字节非 NULL 数据: {:02X?}", tail.len(), tail),
                ));
            }

            let subrecord = Subrecord::parse(&mut cursor, record_type, router).map_err(|e| {
                tracing::debug!(
                    "{} 子记录解析失败 @0x{:X}，已解析 {} 个",
                    record_type,
                    cursor.position(),
                    subrecords.len()
                );
                e
            })?;
            subrecords.push(subrecord);
        }

        Ok((subrecords, Vec::new()))
    }

    pub fn type_str(&self) -> &str {
        std::str::from_utf8(&self.record_type).unwrap_or("????")
    }

    pub fn is_compressed(&self) -> bool {
        self.flags.contains(RecordFlags::COMPRESSED)
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    /// FormID 高字节（主文件索引）
    pub fn master_index(&self) -> usize {
        (self.form_id >> 24) as usize
    }

    pub fn find_subrecord(&self, tag: &[u8; 4]) -> Option<&Subrecord> {
        self.subrecords.iter().find(|sr| &sr.tag == tag)
    }

    pub fn find_subrecords<'a>(&'a self, tag: &'a [u8; 4]) -> impl Iterator<Item = &'a Subrecord> {
        self.subrecords.iter().filter(move |sr| &sr.tag == tag)
    }

    pub fn editor_id(&self) -> Option<String> {
        self.subrecords
            .iter()
            .find(|sr| sr.kind == SubrecordKind::Edid)
            .map(|sr| RawString::parse_zstring(&sr.data).content)
            .filter(|edid| !edid.is_empty())
    }

    /// 替换指定子记录的数据并标记修改
    pub fn set_subrecord_data(&mut self, position: usize, data: Vec<u8>) -> Result<(), EspError> {
        if position >= self.subrecords.len() {
            return Err(EspError::corrupt(self.type_str(), format!("子记录 #{} 不存在", position)));
        }
        let subrecord = &mut self.subrecords[position];
        subrecord.set_data(data);
        self.modified = true;
        Ok(())
    }

    /// 解压后的数据区（子记录 + 填充）
    fn payload(&self) -> Result<Vec<u8>, EspError> {
        let size = self.subrecords.iter().map(Subrecord::serialized_len).sum::<usize>() + self.padding.len();
        let mut buffer = Vec::with_capacity(size);
        for subrecord in &self.subrecords {
            subrecord.write(&mut buffer)?;
        }
        buffer.extend_from_slice(&self.padding);
        Ok(buffer)
    }

    /// 写出的数据区
    fn body(&self) -> Result<Cow<'_, [u8]>, EspError> {
        if let Some(opaque) = &self.opaque {
            return Ok(Cow::Borrowed(opaque));
        }
        if !self.is_compressed() {
            return Ok(Cow::Owned(self.payload()?));
        }
        match &self.original_compressed {
            Some(original) if !self.modified => Ok(Cow::Borrowed(original)),
            _ => Ok(Cow::Owned(compress_record(&self.payload()?)?)),
        }
    }

    /// 写出记录，数据长度按实际内容重新计算
    pub fn write(&self, writer: &mut dyn Write) -> Result<(), EspError> {
        let body = self.body()?;
        let size = u32::try_from(body.len())
            .map_err(|_| EspError::corrupt(self.type_str(), "记录数据超过 4 GiB"))?;

        writer.write_all(&self.record_type)?;
        write_u32(writer, size)?;
        write_u32(writer, self.flags.bits())?;
        write_u32(writer, self.form_id)?;
        write_u16(writer, self.timestamp)?;
        write_u16(writer, self.version_control_info)?;
        write_u16(writer, self.internal_version)?;
        write_u16(writer, self.unknown)?;
        writer.write_all(&body)?;
        Ok(())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, EspError> {
        let mut buffer = Vec::new();
        self.write(&mut buffer)?;
        Ok(buffer)
    }
}

/// `u32 解压长度 + zlib 流`
fn decompress_record(data: &[u8]) -> Result<Vec<u8>, EspError> {
    let mut cursor = Cursor::new(data);
    let expected = read_u32(&mut cursor)? as usize;

    read_decompressed(ZlibDecoder::new(&data[4..]), expected, data.len() - 4, "compressed record")
}

fn compress_record(payload: &[u8]) -> Result<Vec<u8>, EspError> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(payload)?;
    let compressed = encoder.finish()?;

    let mut result = Vec::with_capacity(4 + compressed.len());
    write_u32(&mut result, payload.len() as u32)?;
    result.extend_from_slice(&compressed);
    Ok(result)
}
