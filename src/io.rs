/// IO 抽象层模块
///
/// 提供文件读写的抽象接口，解析器只面向字节切片，文件来源可以替换
/// （内存映射、内存缓冲、测试 mock）。
///
/// - **traits**: Reader/Writer trait 与字节来源类型
/// - **fs_io**: 基于文件系统的默认实现
pub mod traits;
pub mod fs_io;

pub use traits::{FileBytes, FileReader, FileWriter};
pub use fs_io::{DefaultFileReader, DefaultFileWriter};
