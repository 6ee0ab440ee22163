//! 字符串路由
//!
//! 哪些 (记录类型, 子记录类型) 组合承载可翻译文本，以及本地化 ID 应到哪类字符串表查找。

mod data;
mod router;

pub(crate) use data::load_string_records;
pub use router::{DefaultStringRouter, StringRouter};
