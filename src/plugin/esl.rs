use super::Plugin;
use crate::datatypes::RecordFlags;
use crate::utils::EspError;

/// 轻量插件可用的第一个对象编号
const LIGHT_FIRST_ID: u32 = 0x800;
const LIGHT_LAST_ID: u32 = 0xFFF;

impl Plugin {
    /// 转换为轻量插件（ESL）
    ///
    /// 本插件定义的记录按文件顺序从 0x800 开始重新编号，只替换低 12 位，
    /// 来自主文件的覆盖记录保持不变。已带轻量标志的插件不做任何修改，
    /// 其他插件可能已经引用了它现有的 FormID。
    ///
    /// # 返回
    /// 本地记录数；插件已是轻量插件时为 0
    ///
    /// # 错误
    /// 本地记录超过 2048 条时返回 `FormIdOverflow`
    pub fn convert_to_light_plugin(&mut self) -> Result<usize, EspError> {
        if self.header.flags.contains(RecordFlags::LIGHT_MASTER) {
            tracing::info!("{}: 已是轻量插件，跳过转换", self.name());
            return Ok(0);
        }

        let master_count = self.masters.len();
        let local_count = self
            .records()
            .iter()
            .filter(|record| record.master_index() >= master_count)
            .count();

        let capacity = (LIGHT_LAST_ID - LIGHT_FIRST_ID + 1) as usize;
        if local_count > capacity {
            return Err(EspError::FormIdOverflow { count: local_count });
        }

        let mut next_id = LIGHT_FIRST_ID;
        let mut changed = 0usize;
        for record in self.records_mut() {
            if record.master_index() < master_count {
                continue;
            }

            let new_form_id = (record.form_id & 0xFFFF_F000) | next_id;
            if new_form_id != record.form_id {
                tracing::debug!("{} {:08X} -> {:08X}", record.type_str(), record.form_id, new_form_id);
                record.form_id = new_form_id;
                changed += 1;
            }
            next_id += 1;
        }

        self.header.flags.insert(RecordFlags::LIGHT_MASTER);
        tracing::info!(
            "{}: 已转换为轻量插件，{} 条本地记录，{} 条重新编号",
            self.name(),
            local_count,
            changed
        );
        Ok(local_count)
    }
}
