//! TES4 名称哈希
//!
//! 归档按该哈希排序文件夹与文件记录。读取时不依赖哈希（按名称表重建路径），
//! 只有生成归档时才需要计算。

/// 计算文件或文件夹名称的 64 位哈希
///
/// 路径先转为小写并统一为反斜杠分隔；文件夹传入完整相对路径，文件只传文件名。
pub fn name_hash(name: &str) -> u64 {
    let name = name.to_lowercase().replace('/', "\\");
    let (root, ext) = split_extension(&name);
    let chars = root.as_bytes();
    let len = chars.len();

    let mut hash1: u32 = 0;
    if len > 0 {
        hash1 = u32::from(chars[len - 1])
            | (len as u32) << 16
            | u32::from(chars[0]) << 24;
        if len > 2 {
            hash1 |= u32::from(chars[len - 2]) << 8;
        }
    }

    hash1 |= match ext {
        ".kf" => 0x80,
        ".nif" => 0x8000,
        ".dds" => 0x8080,
        ".wav" => 0x8000_0000,
        _ => 0,
    };

    let middle = if len > 3 { &chars[1..len - 2] } else { &[][..] };
    let hash2 = rolling_hash(middle);
    let hash3 = rolling_hash(ext.as_bytes());
    let hash2 = hash2.wrapping_add(hash3);

    (u64::from(hash2) << 32) + u64::from(hash1)
}

fn rolling_hash(bytes: &[u8]) -> u32 {
    bytes
        .iter()
        .fold(0u32, |hash, &c| hash.wrapping_mul(0x1003F).wrapping_add(u32::from(c)))
}

/// 拆分主名与扩展名（扩展名包含点号，点号在首位时视为无扩展名）
fn split_extension(name: &str) -> (&str, &str) {
    let file_start = name.rfind('\\').map(|i| i + 1).unwrap_or(0);
    match name[file_start..].rfind('.') {
        Some(dot) if dot > 0 => name.split_at(file_start + dot),
        _ => (name, ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_extension() {
        assert_eq!(split_extension("bob.dds"), ("bob", ".dds"));
        assert_eq!(split_extension("meshes\\armor"), ("meshes\\armor", ""));
        assert_eq!(split_extension(".hidden"), (".hidden", ""));
        assert_eq!(split_extension("a.b\\file"), ("a.b\\file", ""));
    }

    #[test]
    fn test_short_names() {
        // "bob": hash1 = 'b' | 'o' << 8 | 3 << 16 | 'b' << 24，中段为空
        let expected_hash1 = 0x62 | 0x6F << 8 | 3 << 16 | 0x62 << 24 | 0x8080;
        let expected_hash2 = rolling_hash(b".dds");
        assert_eq!(
            name_hash("Bob.DDS"),
            (u64::from(expected_hash2) << 32) + expected_hash1 as u64
        );
        assert_eq!(name_hash("a"), 0x61 | 1 << 16 | 0x61 << 24);
        assert_eq!(name_hash(""), 0);
    }

    #[test]
    fn test_case_and_separator_insensitive() {
        assert_eq!(name_hash("Interface/Translations"), name_hash("interface\\translations"));
        assert_eq!(name_hash("Skyrim_English.STRINGS"), name_hash("skyrim_english.strings"));
    }

    #[test]
    fn test_middle_characters_matter() {
        assert_ne!(name_hash("abcdef.txt"), name_hash("axxxef.txt"));
        // 首尾与长度相同时仅 hash2 不同
        assert_eq!(
            name_hash("abcdef.txt") & 0xFFFF_FFFF,
            name_hash("axxxef.txt") & 0xFFFF_FFFF
        );
    }
}
