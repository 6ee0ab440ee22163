pub mod bsa;
pub mod cache;
pub mod config;
pub mod datatypes;
pub mod group;
pub mod io;
pub mod plugin;
pub mod reconcile;
pub mod record;
pub mod special_records;
pub mod string_file;
pub mod string_routes;
pub mod string_types;
pub mod subrecord;
pub mod utils;

// 重新导出主要结构
pub use bsa::{Archive, ArchiveBuilder, ArchiveVersion, BsaStringsProvider};
pub use cache::{file_identifier, ExtractionCache};
pub use config::{ExtractOptions, StringFilter};
pub use group::{Group, GroupChild, GroupType};
pub use plugin::{parse_plugin, Plugin, PluginStats, ReplaceReport};
pub use reconcile::{reconcile, unique, ReconcileSummary};
pub use record::Record;
pub use string_file::{
    parse_string_table, NoStrings, StringFile, StringFileSet, StringFileType, StringLookup,
};
pub use string_routes::{DefaultStringRouter, StringRouter};
pub use string_types::{ExtractedString, StringKey, StringStatus};
pub use subrecord::{Subrecord, SubrecordKind};
pub use utils::{is_valid_string, EspError};

// 常量定义
pub const SUPPORTED_EXTENSIONS: &[&str] = &["esp", "esm", "esl"];
