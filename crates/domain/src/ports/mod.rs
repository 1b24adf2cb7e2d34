//! 调度核心依赖的外部协作者
//!
//! 这些接口只描述核心需要的能力，具体实现（Redis、本地文件、进程内集群等）
//! 位于 infrastructure crate。

pub mod election;
pub mod sink;
pub mod source;
pub mod storage;

pub use election::Election;
pub use sink::MetricSink;
pub use source::CheckerSource;
pub use storage::ScheduleStorage;
