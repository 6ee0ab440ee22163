//! 集成测试用的插件字节构造工具
#![allow(dead_code)]

use std::io::Write;

use flate2::write::ZlibEncoder;
use flate2::Compression;

pub const LOCALIZED: u32 = 0x0000_0080;
pub const COMPRESSED: u32 = 0x0004_0000;

pub fn subrecord(tag: &[u8; 4], data: &[u8]) -> Vec<u8> {
    let mut bytes = Vec::new();
    if data.len() > u16::MAX as usize {
        bytes.extend_from_slice(b"XXXX");
        bytes.extend_from_slice(&4u16.to_le_bytes());
        bytes.extend_from_slice(&(data.len() as u32).to_le_bytes());
        bytes.extend_from_slice(tag);
        bytes.extend_from_slice(&0u16.to_le_bytes());
    } else {
        bytes.extend_from_slice(tag);
        bytes.extend_from_slice(&(data.len() as u16).to_le_bytes());
    }
    bytes.extend_from_slice(data);
    bytes
}

pub fn zstring(tag: &[u8; 4], text: &str) -> Vec<u8> {
    let mut data = text.as_bytes().to_vec();
    data.push(0);
    subrecord(tag, &data)
}

pub fn string_id(tag: &[u8; 4], id: u32) -> Vec<u8> {
    subrecord(tag, &id.to_le_bytes())
}

pub fn record(record_type: &[u8; 4], flags: u32, form_id: u32, payload: &[u8]) -> Vec<u8> {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(record_type);
    bytes.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    bytes.extend_from_slice(&flags.to_le_bytes());
    bytes.extend_from_slice(&form_id.to_le_bytes());
    bytes.extend_from_slice(&[0u8; 8]);
    bytes.extend_from_slice(payload);
    bytes
}

pub fn compressed_record(record_type: &[u8; 4], form_id: u32, payload: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(payload).unwrap();
    let mut body = (payload.len() as u32).to_le_bytes().to_vec();
    body.extend(encoder.finish().unwrap());
    record(record_type, COMPRESSED, form_id, &body)
}

pub fn group(label: &[u8; 4], group_type: i32, children: &[u8]) -> Vec<u8> {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(b"GRUP");
    bytes.extend_from_slice(&(24 + children.len() as u32).to_le_bytes());
    bytes.extend_from_slice(label);
    bytes.extend_from_slice(&group_type.to_le_bytes());
    bytes.extend_from_slice(&[0u8; 8]);
    bytes.extend_from_slice(children);
    bytes
}

pub fn header(flags: u32, masters: &[&str]) -> Vec<u8> {
    let mut hedr = Vec::new();
    hedr.extend_from_slice(&1.71f32.to_le_bytes());
    hedr.extend_from_slice(&0u32.to_le_bytes());
    hedr.extend_from_slice(&0x800u32.to_le_bytes());

    let mut payload = subrecord(b"HEDR", &hedr);
    payload.extend(zstring(b"CNAM", "Tester"));
    for master in masters {
        payload.extend(zstring(b"MAST", master));
        payload.extend(subrecord(b"DATA", &0u64.to_le_bytes()));
    }
    record(b"TES4", flags, 0, &payload)
}

/// 带一个任务、一把武器、一个压缩的 NPC 和一个超长子记录的插件
pub fn sample_plugin() -> Vec<u8> {
    let mut bytes = header(0, &["Skyrim.esm"]);

    let mut quest = zstring(b"EDID", "MyQuest");
    quest.extend(zstring(b"FULL", "My Quest"));
    quest.extend(subrecord(b"INDX", &[10, 0, 0, 0]));
    quest.extend(subrecord(b"CTDA", &[3u8; 32]));
    quest.extend(zstring(b"CNAM", "I met a stranger."));
    quest.extend(subrecord(b"QOBJ", &[10, 0]));
    quest.extend(zstring(b"NNAM", "Talk to the stranger"));
    bytes.extend(group(b"QUST", 0, &record(b"QUST", 0, 0x0100_0D62, &quest)));

    let mut weapon = zstring(b"EDID", "MyIronSword");
    weapon.extend(zstring(b"FULL", "Rusty Iron Sword"));
    weapon.extend(zstring(b"DESC", "An old blade."));
    weapon.extend(subrecord(b"DATA", &[0x19, 0, 0, 0, 0, 0, 0x10, 0x41, 7, 0]));
    let mut overridden = zstring(b"EDID", "IronSword");
    overridden.extend(zstring(b"FULL", "Iron Sword"));
    let mut weapons = record(b"WEAP", 0, 0x0100_0800, &weapon);
    weapons.extend(record(b"WEAP", 0, 0x0001_2EB7, &overridden));
    bytes.extend(group(b"WEAP", 0, &weapons));

    let mut npc = zstring(b"EDID", "MyStranger");
    npc.extend(zstring(b"FULL", "Stranger"));
    npc.extend(zstring(b"SHRT", "Stranger"));
    bytes.extend(group(b"NPC_", 0, &compressed_record(b"NPC_", 0x0100_0801, &npc)));

    let mut world = zstring(b"EDID", "MyWorld");
    world.extend(subrecord(b"OFST", &vec![0x5Au8; 70_000]));
    bytes.extend(group(b"WRLD", 0, &record(b"WRLD", 0, 0x0100_0802, &world)));

    bytes
}

/// 字符串表字节，`length_prefixed` 对应 DLSTRINGS/ILSTRINGS
pub fn string_table(length_prefixed: bool, entries: &[(u32, &str)]) -> Vec<u8> {
    let mut directory = Vec::new();
    let mut data = Vec::new();
    for (id, text) in entries {
        directory.extend_from_slice(&id.to_le_bytes());
        directory.extend_from_slice(&(data.len() as u32).to_le_bytes());
        if length_prefixed {
            data.extend_from_slice(&(text.len() as u32 + 1).to_le_bytes());
        }
        data.extend_from_slice(text.as_bytes());
        data.push(0);
    }

    let mut bytes = (entries.len() as u32).to_le_bytes().to_vec();
    bytes.extend_from_slice(&(data.len() as u32).to_le_bytes());
    bytes.extend(directory);
    bytes.extend(data);
    bytes
}

/// 本地化插件：一把本地武器和一条覆盖记录，文本存放在字符串表中
pub fn localized_plugin() -> Vec<u8> {
    let mut bytes = header(LOCALIZED, &["Skyrim.esm"]);

    let mut weapon = zstring(b"EDID", "MyIronSword");
    weapon.extend(string_id(b"FULL", 1));
    weapon.extend(string_id(b"DESC", 2));
    let mut overridden = zstring(b"EDID", "IronSword");
    overridden.extend(string_id(b"FULL", 3));
    let mut weapons = record(b"WEAP", 0, 0x0100_0800, &weapon);
    weapons.extend(record(b"WEAP", 0, 0x0001_2EB7, &overridden));
    bytes.extend(group(b"WEAP", 0, &weapons));

    bytes
}

pub fn localized_strings() -> Vec<u8> {
    string_table(false, &[(1, "Rusty Iron Sword"), (3, "Iron Sword")])
}

pub fn localized_dlstrings() -> Vec<u8> {
    string_table(true, &[(2, "An old blade.")])
}
