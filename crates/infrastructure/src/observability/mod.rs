//! Observability module
//!
//! 引擎内部指标与结构化日志辅助函数。日志订阅器的初始化位于 `checker_core::logging`。

pub mod metrics_collector;
pub mod structured_logger;

pub use metrics_collector::{init_metrics, MetricsCollector};
pub use structured_logger::StructuredLogger;
