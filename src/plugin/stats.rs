use serde::Serialize;

use super::Plugin;
use crate::datatypes::flag_names;
use crate::string_file::StringLookup;

/// 插件统计信息
#[derive(Debug, Clone, Serialize)]
pub struct PluginStats {
    pub name: String,
    pub plugin_type: String,
    pub flags: Vec<String>,
    pub masters: Vec<String>,
    pub group_count: usize,
    /// 含头记录
    pub record_count: usize,
    pub compressed_record_count: usize,
    pub string_count: usize,
}

impl std::fmt::Display for PluginStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== 插件统计信息 ===")?;
        writeln!(f, "名称: {}", self.name)?;
        writeln!(f, "类型: {}", self.plugin_type)?;
        writeln!(f, "标志: {}", self.flags.join(" | "))?;
        writeln!(f, "依赖主文件数: {}", self.masters.len())?;
        for master in &self.masters {
            writeln!(f, "  - {}", master)?;
        }
        writeln!(f, "组数量: {}", self.group_count)?;
        writeln!(f, "记录数量: {} (压缩 {})", self.record_count, self.compressed_record_count)?;
        writeln!(f, "可翻译字符串数: {}", self.string_count)?;
        Ok(())
    }
}

impl Plugin {
    /// 获取统计信息，本地化插件的字符串数取决于 `lookup`
    pub fn stats(&self, lookup: &dyn StringLookup) -> PluginStats {
        let records = self.records();

        PluginStats {
            name: self.name().to_string(),
            plugin_type: self.plugin_type().to_string(),
            flags: flag_names(&self.header.flags)
                .into_iter()
                .map(str::to_string)
                .collect(),
            masters: self.masters.clone(),
            group_count: self.groups.iter().map(|group| group.count_groups()).sum(),
            record_count: 1 + records.len(),
            compressed_record_count: records.iter().filter(|record| record.is_compressed()).count(),
            string_count: self.extract_strings(lookup).len(),
        }
    }
}
