//! ESP/ESM/ESL 插件
//!
//! 插件由一个 TES4 头记录和其后的顶级组构成。解析保留全部字节信息，
//! 未修改的插件写回后与输入逐字节相同。

use std::path::PathBuf;
use std::sync::Arc;

use crate::datatypes::RecordFlags;
use crate::group::Group;
use crate::record::Record;
use crate::string_routes::StringRouter;

mod esl;
mod parser;
mod stats;
mod strings;
mod translate;
mod writer;

pub use parser::parse_plugin;
pub use stats::PluginStats;
pub use strings::ReplaceReport;

/// ESP插件解析器
#[derive(Debug, Clone)]
pub struct Plugin {
    /// 文件路径（内存中解析时只有文件名）
    pub path: PathBuf,
    /// 头部记录
    pub header: Record,
    /// 顶级组，保持文件中的顺序
    pub groups: Vec<Group>,
    /// 主文件列表
    pub masters: Vec<String>,
    router: Arc<dyn StringRouter>,
}

impl Plugin {
    /// 插件文件名，例如 `MyMod.esp`
    pub fn name(&self) -> &str {
        self.path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default()
    }

    /// 不带扩展名的文件名，STRING 文件以此命名
    pub fn stem(&self) -> &str {
        self.path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or_default()
    }

    pub fn flags(&self) -> RecordFlags {
        self.header.flags
    }

    pub fn is_master(&self) -> bool {
        self.header.flags.contains(RecordFlags::MASTER_FILE)
    }

    /// 文本是否存放在外部 STRING 文件中
    pub fn is_localized(&self) -> bool {
        self.header.flags.contains(RecordFlags::LOCALIZED)
    }

    pub fn is_light(&self) -> bool {
        self.header.flags.contains(RecordFlags::LIGHT_MASTER)
            || self.extension().as_deref() == Some("esl")
    }

    fn extension(&self) -> Option<String> {
        self.path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
    }

    /// 插件类型描述
    pub fn plugin_type(&self) -> &'static str {
        match (self.extension().as_deref(), self.is_master(), self.is_light()) {
            (Some("esl"), _, _) => "ESL",
            (_, true, true) => "ESM (Light)",
            (_, true, false) => "ESM",
            (_, false, true) => "ESP (Light)",
            _ => "ESP",
        }
    }

    /// 定义该 FormID 的插件名
    ///
    /// 高字节小于主文件数时指向对应主文件，否则记录由本插件定义。
    pub fn resolve_master(&self, form_id: u32) -> &str {
        let index = (form_id >> 24) as usize;
        match self.masters.get(index) {
            Some(master) => master,
            None => self.name(),
        }
    }

    pub fn string_router(&self) -> &dyn StringRouter {
        self.router.as_ref()
    }

    /// 所有记录（不含头记录），按文件顺序
    pub fn records(&self) -> Vec<&Record> {
        self.groups.iter().flat_map(|group| group.records()).collect()
    }

    pub fn records_mut(&mut self) -> Vec<&mut Record> {
        self.groups.iter_mut().flat_map(|group| group.records_mut()).collect()
    }
}
