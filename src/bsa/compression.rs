//! 文件数据块的压缩与解压
//!
//! v103/v104 使用 zlib，v105 使用 LZ4 帧格式。

use std::io::Write;

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use super::header::ArchiveVersion;
use crate::datatypes::read_decompressed;
use crate::utils::EspError;

/// 解压数据块并校验解压后的长度
pub fn decompress(
    version: ArchiveVersion,
    compressed: &[u8],
    expected_size: usize,
) -> Result<Vec<u8>, EspError> {
    match version {
        ArchiveVersion::SkyrimSe => read_decompressed(
            lz4_flex::frame::FrameDecoder::new(compressed),
            expected_size,
            compressed.len(),
            "compressed file (lz4)",
        ),
        ArchiveVersion::Oblivion | ArchiveVersion::Skyrim => read_decompressed(
            ZlibDecoder::new(compressed),
            expected_size,
            compressed.len(),
            "compressed file (zlib)",
        ),
    }
}

/// 按版本对应的编解码器压缩
pub fn compress(version: ArchiveVersion, data: &[u8]) -> Result<Vec<u8>, EspError> {
    match version {
        ArchiveVersion::SkyrimSe => {
            let mut encoder = lz4_flex::frame::FrameEncoder::new(Vec::new());
            encoder.write_all(data)?;
            encoder
                .finish()
                .map_err(|e| EspError::corrupt("lz4 frame", e.to_string()))
        }
        ArchiveVersion::Oblivion | ArchiveVersion::Skyrim => {
            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(data)?;
            Ok(encoder.finish()?)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_both_codecs() {
        let data = b"Interface translations ".repeat(40);
        for version in [ArchiveVersion::Skyrim, ArchiveVersion::SkyrimSe] {
            let packed = compress(version, &data).unwrap();
            assert!(packed.len() < data.len());
            assert_eq!(decompress(version, &packed, data.len()).unwrap(), data);
        }
    }

    #[test]
    fn test_size_mismatch_is_corrupt() {
        let packed = compress(ArchiveVersion::Skyrim, b"hello world").unwrap();
        let result = decompress(ArchiveVersion::Skyrim, &packed, 5);
        assert!(matches!(result, Err(EspError::CorruptFormat { .. })));
    }

    #[test]
    fn test_declared_size_is_not_trusted() {
        let packed = compress(ArchiveVersion::Skyrim, b"hello world").unwrap();
        let result = decompress(ArchiveVersion::Skyrim, &packed, u32::MAX as usize);
        assert!(matches!(result, Err(EspError::CorruptFormat { .. })));

        // 高压缩比的数据只解出声明长度 + 1 字节
        let bomb = compress(ArchiveVersion::SkyrimSe, &vec![0u8; 4 * 1024 * 1024]).unwrap();
        let result = decompress(ArchiveVersion::SkyrimSe, &bomb, 16);
        assert!(matches!(result, Err(EspError::CorruptFormat { .. })));
    }

    #[test]
    fn test_wrong_codec_is_corrupt() {
        let packed = compress(ArchiveVersion::Skyrim, b"hello world").unwrap();
        let result = decompress(ArchiveVersion::SkyrimSe, &packed, 11);
        assert!(result.is_err());
    }
}
