use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Read, Seek, SeekFrom, Write};

use crate::utils::EspError;

// 基础整数类型读取函数
//
// 所有读取失败（数据不足）统一映射为 CorruptFormat，数值本身不做任何校验。

fn truncated(what: &str, err: std::io::Error) -> EspError {
    EspError::corrupt(what, err.to_string())
}

pub fn read_u8(cursor: &mut Cursor<&[u8]>) -> Result<u8, EspError> {
    cursor.read_u8().map_err(|e| truncated("u8", e))
}

pub fn read_i8(cursor: &mut Cursor<&[u8]>) -> Result<i8, EspError> {
    cursor.read_i8().map_err(|e| truncated("i8", e))
}

pub fn read_u16(cursor: &mut Cursor<&[u8]>) -> Result<u16, EspError> {
    cursor.read_u16::<LittleEndian>().map_err(|e| truncated("u16", e))
}

pub fn read_i16(cursor: &mut Cursor<&[u8]>) -> Result<i16, EspError> {
    cursor.read_i16::<LittleEndian>().map_err(|e| truncated("i16", e))
}

pub fn read_u32(cursor: &mut Cursor<&[u8]>) -> Result<u32, EspError> {
    cursor.read_u32::<LittleEndian>().map_err(|e| truncated("u32", e))
}

pub fn read_i32(cursor: &mut Cursor<&[u8]>) -> Result<i32, EspError> {
    cursor.read_i32::<LittleEndian>().map_err(|e| truncated("i32", e))
}

pub fn read_u64(cursor: &mut Cursor<&[u8]>) -> Result<u64, EspError> {
    cursor.read_u64::<LittleEndian>().map_err(|e| truncated("u64", e))
}

pub fn read_i64(cursor: &mut Cursor<&[u8]>) -> Result<i64, EspError> {
    cursor.read_i64::<LittleEndian>().map_err(|e| truncated("i64", e))
}

pub fn read_f32(cursor: &mut Cursor<&[u8]>) -> Result<f32, EspError> {
    cursor.read_f32::<LittleEndian>().map_err(|e| truncated("f32", e))
}

/// 读取固定长度的字节
pub fn read_bytes(cursor: &mut Cursor<&[u8]>, len: usize) -> Result<Vec<u8>, EspError> {
    let remaining = remaining(cursor);
    if len > remaining {
        return Err(EspError::corrupt(
            "bytes",
            format!("需要 {} 字节，剩余 {} 字节", len, remaining),
        ));
    }
    let mut buffer = vec![0u8; len];
    cursor.read_exact(&mut buffer).map_err(|e| truncated("bytes", e))?;
    Ok(buffer)
}

/// 读取 4 字节类型标签
pub fn read_tag(cursor: &mut Cursor<&[u8]>) -> Result<[u8; 4], EspError> {
    let mut tag = [0u8; 4];
    cursor.read_exact(&mut tag).map_err(|e| truncated("tag", e))?;
    Ok(tag)
}

/// 窥视接下来的 `len` 个字节，游标位置不变
pub fn peek_bytes(cursor: &mut Cursor<&[u8]>, len: usize) -> Result<Vec<u8>, EspError> {
    let position = cursor.position();
    let result = read_bytes(cursor, len);
    cursor.set_position(position);
    result
}

pub fn peek_tag(cursor: &mut Cursor<&[u8]>) -> Result<[u8; 4], EspError> {
    let position = cursor.position();
    let result = read_tag(cursor);
    cursor.set_position(position);
    result
}

/// 游标之后剩余的字节数
pub fn remaining(cursor: &Cursor<&[u8]>) -> usize {
    let len = cursor.get_ref().len() as u64;
    len.saturating_sub(cursor.position()) as usize
}

/// 从解码器读出恰好 `expected_size` 字节
///
/// 声明的长度来自文件本身，不可信：预分配按压缩数据长度封顶，
/// 读取量限制在 `expected_size + 1`，多出或不足都返回 CorruptFormat。
pub fn read_decompressed(
    decoder: impl Read,
    expected_size: usize,
    compressed_len: usize,
    context: &str,
) -> Result<Vec<u8>, EspError> {
    let capacity = expected_size.min(compressed_len.saturating_mul(8));
    let mut decompressed = Vec::with_capacity(capacity);
    decoder
        .take(expected_size as u64 + 1)
        .read_to_end(&mut decompressed)
        .map_err(|e| EspError::corrupt(context, format!("解压失败 ({} 字节): {}", compressed_len, e)))?;

    if decompressed.len() != expected_size {
        return Err(EspError::corrupt(
            context,
            format!("解压后长度与声明的 {} 字节不符", expected_size),
        ));
    }
    Ok(decompressed)
}

/// 跳过 `len` 字节
pub fn skip(cursor: &mut Cursor<&[u8]>, len: usize) -> Result<(), EspError> {
    if len > remaining(cursor) {
        return Err(EspError::corrupt("skip", format!("无法跳过 {} 字节", len)));
    }
    cursor
        .seek(SeekFrom::Current(len as i64))
        .map_err(|e| truncated("skip", e))?;
    Ok(())
}

// 基础整数类型写入函数
pub fn write_u8(writer: &mut dyn Write, value: u8) -> Result<(), std::io::Error> {
    writer.write_u8(value)
}

pub fn write_i8(writer: &mut dyn Write, value: i8) -> Result<(), std::io::Error> {
    writer.write_i8(value)
}

pub fn write_u16(writer: &mut dyn Write, value: u16) -> Result<(), std::io::Error> {
    writer.write_u16::<LittleEndian>(value)
}

pub fn write_i16(writer: &mut dyn Write, value: i16) -> Result<(), std::io::Error> {
    writer.write_i16::<LittleEndian>(value)
}

pub fn write_u32(writer: &mut dyn Write, value: u32) -> Result<(), std::io::Error> {
    writer.write_u32::<LittleEndian>(value)
}

pub fn write_i32(writer: &mut dyn Write, value: i32) -> Result<(), std::io::Error> {
    writer.write_i32::<LittleEndian>(value)
}

pub fn write_u64(writer: &mut dyn Write, value: u64) -> Result<(), std::io::Error> {
    writer.write_u64::<LittleEndian>(value)
}

pub fn write_i64(writer: &mut dyn Write, value: i64) -> Result<(), std::io::Error> {
    writer.write_i64::<LittleEndian>(value)
}

pub fn write_f32(writer: &mut dyn Write, value: f32) -> Result<(), std::io::Error> {
    writer.write_f32::<LittleEndian>(value)
}

// 支持的编码（按尝试顺序）
pub const SUPPORTED_ENCODINGS: &[&str] = &["utf-8", "windows-1250", "windows-1252", "windows-1251"];

/// 带原始编码信息的字符串
///
/// 解码时记住成功的编码，写回时用同一编码重新编码，保证未修改文本字节不变。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawString {
    pub content: String,
    pub encoding: String,
}

impl RawString {
    pub fn new(content: impl Into<String>, encoding: impl Into<String>) -> Self {
        RawString {
            content: content.into(),
            encoding: encoding.into(),
        }
    }

    /// 按 `SUPPORTED_ENCODINGS` 顺序尝试解码，全部失败时回退到有损 UTF-8
    ///
    /// 单字节代码页在 encoding_rs 中不会报错，未定义的字节被映射成 C1 控制字符，
    /// 因此出现 U+0080..U+009F 视为该代码页不匹配，继续尝试下一个。
    pub fn decode(data: &[u8]) -> Self {
        for encoding_name in SUPPORTED_ENCODINGS {
            let Some(encoding) = encoding_rs::Encoding::for_label(encoding_name.as_bytes()) else {
                continue;
            };
            let (decoded, had_errors) = encoding.decode_without_bom_handling(data);
            if had_errors {
                continue;
            }
            if encoding != encoding_rs::UTF_8 && decoded.chars().any(|c| ('\u{80}'..='\u{9F}').contains(&c)) {
                continue;
            }
            return RawString {
                content: decoded.into_owned(),
                encoding: encoding_name.to_string(),
            };
        }

        tracing::debug!("文本无法以任何已知编码解码，使用有损 UTF-8: {} 字节", data.len());
        RawString {
            content: String::from_utf8_lossy(data).into_owned(),
            encoding: "utf-8".to_string(),
        }
    }

    /// 使用记录的编码重新编码
    ///
    /// 旧代码页无法表示的字符会返回 EncodingFailure，由调用方决定是否改用 UTF-8。
    pub fn encode(&self) -> Result<Vec<u8>, EspError> {
        let encoding = encoding_rs::Encoding::for_label(self.encoding.as_bytes())
            .ok_or_else(|| EspError::EncodingFailure(format!("未知编码: {}", self.encoding)))?;
        if encoding == encoding_rs::UTF_8 {
            return Ok(self.content.as_bytes().to_vec());
        }
        let (encoded, _, had_errors) = encoding.encode(&self.content);
        if had_errors {
            return Err(EspError::EncodingFailure(format!(
                "文本无法以 {} 编码",
                self.encoding
            )));
        }
        Ok(encoded.into_owned())
    }

    /// 编码为以 null 结尾的字节串
    pub fn encode_zstring(&self) -> Result<Vec<u8>, EspError> {
        let mut bytes = self.encode()?;
        bytes.push(0);
        Ok(bytes)
    }

    /// Z字符串解析(以null结尾)
    pub fn parse_zstring(data: &[u8]) -> Self {
        let null_pos = data.iter().position(|&b| b == 0).unwrap_or(data.len());
        Self::decode(&data[..null_pos])
    }

    /// 从游标读取 Z 字符串，游标停在 null 之后
    pub fn read_zstring(cursor: &mut Cursor<&[u8]>) -> Result<Self, EspError> {
        let start = cursor.position() as usize;
        let data = *cursor.get_ref();
        let tail = data
            .get(start..)
            .ok_or_else(|| EspError::corrupt("zstring", "游标越界"))?;
        let null_pos = tail
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| EspError::corrupt("zstring", "缺少结尾 null"))?;
        cursor.set_position((start + null_pos + 1) as u64);
        Ok(Self::decode(&tail[..null_pos]))
    }

    /// B字符串解析(u8 长度前缀，无结尾 null)
    pub fn parse_bstring(cursor: &mut Cursor<&[u8]>) -> Result<Self, EspError> {
        let length = read_u8(cursor)? as usize;
        let buffer = read_bytes(cursor, length)?;
        Ok(Self::decode(&buffer))
    }

    /// BZ字符串解析(u8 长度前缀，长度包含结尾 null)
    pub fn parse_bzstring(cursor: &mut Cursor<&[u8]>) -> Result<Self, EspError> {
        let length = read_u8(cursor)? as usize;
        let mut buffer = read_bytes(cursor, length)?;
        if let Some(null_pos) = buffer.iter().position(|&b| b == 0) {
            buffer.truncate(null_pos);
        }
        Ok(Self::decode(&buffer))
    }

    /// W字符串解析(u16 长度前缀)
    pub fn parse_wstring(cursor: &mut Cursor<&[u8]>) -> Result<Self, EspError> {
        let length = read_u16(cursor)? as usize;
        let buffer = read_bytes(cursor, length)?;
        Ok(Self::decode(&buffer))
    }

    pub fn write_bstring(&self, writer: &mut dyn Write) -> Result<(), EspError> {
        let bytes = self.encode()?;
        let len = u8::try_from(bytes.len())
            .map_err(|_| EspError::corrupt("bstring", "字符串超过 255 字节"))?;
        write_u8(writer, len)?;
        writer.write_all(&bytes)?;
        Ok(())
    }

    pub fn write_bzstring(&self, writer: &mut dyn Write) -> Result<(), EspError> {
        let bytes = self.encode_zstring()?;
        let len = u8::try_from(bytes.len())
            .map_err(|_| EspError::corrupt("bzstring", "字符串超过 255 字节"))?;
        write_u8(writer, len)?;
        writer.write_all(&bytes)?;
        Ok(())
    }

    pub fn write_wstring(&self, writer: &mut dyn Write) -> Result<(), EspError> {
        let bytes = self.encode()?;
        let len = u16::try_from(bytes.len())
            .map_err(|_| EspError::corrupt("wstring", "字符串超过 65535 字节"))?;
        write_u16(writer, len)?;
        writer.write_all(&bytes)?;
        Ok(())
    }
}

impl std::fmt::Display for RawString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.content)
    }
}

/// 按名称表解码标志位，返回已置位的名称（按表顺序）
pub fn decode_flags<'a>(value: u32, table: &[(u32, &'a str)]) -> Vec<&'a str> {
    table
        .iter()
        .filter(|(bit, _)| value & bit == *bit && *bit != 0)
        .map(|(_, name)| *name)
        .collect()
}

/// 按名称表编码标志位，未知名称被忽略
pub fn encode_flags(names: &[&str], table: &[(u32, &str)]) -> u32 {
    names
        .iter()
        .filter_map(|name| table.iter().find(|(_, n)| n == name).map(|(bit, _)| *bit))
        .fold(0, |acc, bit| acc | bit)
}

/// bitflags 类型的名称表
pub fn flag_names<F: bitflags::Flags>(flags: &F) -> Vec<&'static str> {
    flags.iter_names().map(|(name, _)| name).collect()
}

// 记录标志位定义
bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct RecordFlags: u32 {
        const MASTER_FILE = 0x00000001;        // ESM标志
        const DELETED = 0x00000020;            // 已删除
        const LOCALIZED = 0x00000080;          // 本地化
        const LIGHT_MASTER = 0x00000200;       // 轻量级主文件
        const PERSISTENT = 0x00000400;         // 持久化
        const DISABLED = 0x00000800;           // 禁用
        const IGNORED = 0x00001000;            // 忽略
        const VISIBLE_DISTANT = 0x00008000;    // 远距离可见
        const COMPRESSED = 0x00040000;         // 压缩

        // 其余位原样保留
        const _ = !0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_reads_advance_cursor() {
        let data: &[u8] = &[0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0xFF];
        let mut cursor = Cursor::new(data);
        assert_eq!(read_u16(&mut cursor).unwrap(), 0x0201);
        assert_eq!(read_u16(&mut cursor).unwrap(), 0x0403);
        assert_eq!(read_u32(&mut cursor).unwrap(), 0x08070605);
        assert_eq!(read_i8(&mut cursor).unwrap(), -1);
        assert!(read_u8(&mut cursor).is_err());
    }

    #[test]
    fn test_peek_restores_position() {
        let data: &[u8] = b"GRUPxxxx";
        let mut cursor = Cursor::new(data);
        assert_eq!(&peek_tag(&mut cursor).unwrap(), b"GRUP");
        assert_eq!(cursor.position(), 0);
        assert_eq!(peek_bytes(&mut cursor, 6).unwrap(), b"GRUPxx");
        assert_eq!(cursor.position(), 0);
        assert!(peek_bytes(&mut cursor, 9).is_err());
        assert_eq!(cursor.position(), 0);
    }

    #[test]
    fn test_float_any_bit_pattern() {
        let data: &[u8] = &[0xFF, 0xFF, 0xFF, 0xFF];
        let mut cursor = Cursor::new(data);
        assert!(read_f32(&mut cursor).unwrap().is_nan());
    }

    #[test]
    fn test_decode_prefers_utf8() {
        let raw = RawString::decode("铁剑".as_bytes());
        assert_eq!(raw.content, "铁剑");
        assert_eq!(raw.encoding, "utf-8");
    }

    #[test]
    fn test_decode_falls_back_to_codepage() {
        // 0xE9 在 UTF-8 中非法，在 windows-1250 中为 'é'
        let raw = RawString::decode(&[b'C', b'a', b'f', 0xE9]);
        assert_eq!(raw.encoding, "windows-1250");
        assert_eq!(raw.content, "Café");
        assert_eq!(raw.encode().unwrap(), vec![b'C', b'a', b'f', 0xE9]);
    }

    #[test]
    fn test_decode_skips_undefined_codepage_bytes() {
        // 0x98 在 windows-1250 中未定义，在 windows-1252 中为 '˜'
        let raw = RawString::decode(&[b'a', 0x98, b'b']);
        assert_eq!(raw.encoding, "windows-1252");
        assert_eq!(raw.content, "a˜b");

        // 0x81 在 windows-1250 和 windows-1252 中都未定义
        let raw = RawString::decode(&[0x81, 0xE0]);
        assert_eq!(raw.encoding, "windows-1251");
        assert_eq!(raw.content, "Ѓа");
        assert_eq!(raw.encode().unwrap(), vec![0x81, 0xE0]);

        let raw = RawString::decode(&[0x81, 0x98]);
        assert_eq!(raw.encoding, "utf-8");
        assert_eq!(raw.content, "\u{FFFD}\u{FFFD}");
    }

    #[test]
    fn test_encode_failure_in_codepage() {
        let raw = RawString::new("铁剑", "windows-1252");
        assert!(matches!(raw.encode(), Err(EspError::EncodingFailure(_))));
    }

    #[test]
    fn test_length_prefixed_strings() {
        let mut buffer = Vec::new();
        RawString::new("meshes", "utf-8").write_bzstring(&mut buffer).unwrap();
        RawString::new("abc", "utf-8").write_bstring(&mut buffer).unwrap();
        RawString::new("wide", "utf-8").write_wstring(&mut buffer).unwrap();
        assert_eq!(buffer[0], 7);

        let mut cursor = Cursor::new(buffer.as_slice());
        assert_eq!(RawString::parse_bzstring(&mut cursor).unwrap().content, "meshes");
        assert_eq!(RawString::parse_bstring(&mut cursor).unwrap().content, "abc");
        assert_eq!(RawString::parse_wstring(&mut cursor).unwrap().content, "wide");
        assert_eq!(remaining(&cursor), 0);
    }

    #[test]
    fn test_read_zstring() {
        let data: &[u8] = b"first\0second\0";
        let mut cursor = Cursor::new(data);
        assert_eq!(RawString::read_zstring(&mut cursor).unwrap().content, "first");
        assert_eq!(RawString::read_zstring(&mut cursor).unwrap().content, "second");
        assert!(RawString::read_zstring(&mut cursor).is_err());
    }

    #[test]
    fn test_named_flags() {
        const TABLE: &[(u32, &str)] = &[(0x1, "Meshes"), (0x2, "Textures"), (0x100, "Misc")];
        assert_eq!(decode_flags(0x103, TABLE), vec!["Meshes", "Textures", "Misc"]);
        assert_eq!(encode_flags(&["Textures", "Misc", "Bogus"], TABLE), 0x102);
    }

    #[test]
    fn test_record_flags_keep_unknown_bits() {
        let flags = RecordFlags::from_bits_retain(0x0004_0081 | 0x0010_0000);
        assert!(flags.contains(RecordFlags::COMPRESSED));
        assert!(flags.contains(RecordFlags::LOCALIZED));
        assert_eq!(flags.bits(), 0x0014_0081);
        assert!(flag_names(&flags).contains(&"MASTER_FILE"));
    }
}
