mod common;

use common::*;
use esp_codec::{Archive, ArchiveBuilder, ArchiveVersion, BsaStringsProvider, Plugin, StringFileSet};
use tempfile::TempDir;

fn sample_archive(version: ArchiveVersion) -> Vec<u8> {
    let mut builder = ArchiveBuilder::new(version).compressed(true);
    builder
        .add_file("textures/armor/Iron.dds", vec![7u8; 4096])
        .add_file("textures/armor/steel.dds", b"steel".to_vec())
        .add_file("meshes/Sword.nif", b"NIF data".repeat(64));
    builder.build().unwrap()
}

#[test]
fn test_lists_and_looks_up_entries() {
    for version in [ArchiveVersion::Oblivion, ArchiveVersion::Skyrim, ArchiveVersion::SkyrimSe] {
        let archive = Archive::from_bytes(sample_archive(version)).unwrap();
        assert_eq!(archive.len(), 3);
        assert_eq!(
            archive.list_paths(),
            vec!["meshes/sword.nif", "textures/armor/iron.dds", "textures/armor/steel.dds"]
        );

        assert!(archive.contains("TEXTURES\\ARMOR\\IRON.DDS"));
        assert_eq!(archive.extract_to_memory("Textures/Armor/Iron.dds").unwrap(), vec![7u8; 4096]);
        assert_eq!(archive.extract_to_memory("meshes/sword.nif").unwrap(), b"NIF data".repeat(64));
        assert!(archive.verify_hashes().is_empty());
    }
}

#[test]
fn test_glob() {
    let archive = Archive::from_bytes(sample_archive(ArchiveVersion::SkyrimSe)).unwrap();
    assert_eq!(archive.glob("textures/*/*.dds").len(), 2);
    assert_eq!(archive.glob("**/*.NIF"), vec!["meshes/sword.nif"]);
    assert!(archive.glob("*.esp").is_empty());
}

#[test]
fn test_extract_to_disk() {
    let dir = TempDir::new().unwrap();
    let archive_path = dir.path().join("Assets.bsa");
    std::fs::write(&archive_path, sample_archive(ArchiveVersion::Skyrim)).unwrap();

    let archive = Archive::open(&archive_path).unwrap();
    let destination = dir.path().join("out");
    let report = archive.extract_all(&destination);
    assert_eq!(report.extracted.len(), 3);
    assert!(report.failed.is_empty());

    let iron = destination.join("textures").join("armor").join("iron.dds");
    assert_eq!(std::fs::metadata(iron).unwrap().len(), 4096);

    let single = archive.extract("textures/armor/steel.dds", &dir.path().join("single")).unwrap();
    assert_eq!(std::fs::read(single).unwrap(), b"steel");
    assert!(archive.extract("missing.dds", &destination).is_err());
}

#[test]
fn test_extract_uses_case_insensitive_lookup() {
    let dir = TempDir::new().unwrap();
    let archive = Archive::from_bytes(sample_archive(ArchiveVersion::SkyrimSe)).unwrap();

    let target = archive.extract("TEXTURES\\Armor\\IRON.DDS", dir.path()).unwrap();
    assert_eq!(target, dir.path().join("textures/armor/iron.dds"));
    assert_eq!(std::fs::read(&target).unwrap(), vec![7u8; 4096]);
}

#[test]
fn test_extract_empty_entry() {
    let dir = TempDir::new().unwrap();
    let mut builder = ArchiveBuilder::new(ArchiveVersion::Skyrim);
    builder
        .add_file("interface/empty.txt", Vec::new())
        .add_file("interface/note.txt", b"note".to_vec());
    let archive = Archive::from_bytes(builder.build().unwrap()).unwrap();

    assert!(archive.extract_to_memory("interface/empty.txt").unwrap().is_empty());
    let target = archive.extract("interface/empty.txt", dir.path()).unwrap();
    assert_eq!(std::fs::metadata(&target).unwrap().len(), 0);

    let report = archive.extract_all(&dir.path().join("all"));
    assert_eq!(report.extracted.len(), 2);
    assert!(report.failed.is_empty());
}

#[test]
fn test_rejects_bad_archives() {
    let mut bytes = sample_archive(ArchiveVersion::Skyrim);
    bytes[..4].copy_from_slice(b"BTDX");
    assert!(Archive::from_bytes(bytes).is_err());

    let mut bytes = sample_archive(ArchiveVersion::Skyrim);
    bytes[4..8].copy_from_slice(&106u32.to_le_bytes());
    assert!(Archive::from_bytes(bytes).is_err());
}

#[test]
fn test_strings_from_plugin_archive() {
    let dir = TempDir::new().unwrap();
    let plugin_path = dir.path().join("MyMod.esp");
    std::fs::write(&plugin_path, localized_plugin()).unwrap();

    let mut builder = ArchiveBuilder::new(ArchiveVersion::SkyrimSe);
    builder
        .add_file("strings/mymod_english.strings", localized_strings())
        .add_file("strings/mymod_english.dlstrings", localized_dlstrings());
    std::fs::write(dir.path().join("MyMod.bsa"), builder.build().unwrap()).unwrap();

    let provider = BsaStringsProvider::open_for_plugin(&plugin_path).unwrap();
    assert_eq!(provider.list_strings_files().len(), 2);

    // 没有 Strings 目录时回退到同名归档
    let tables = StringFileSet::load_for_plugin(&plugin_path, "english").unwrap();
    assert_eq!(tables.total_count(), 3);

    let plugin = Plugin::parse(&plugin_path).unwrap();
    let strings = plugin.extract_strings(&tables);
    assert_eq!(strings.len(), 3);
    assert!(strings.iter().any(|s| s.original_text == "Rusty Iron Sword"));
}
