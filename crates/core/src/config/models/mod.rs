pub mod app_config;
pub mod dispatcher_worker;
pub mod infrastructure;
pub mod observability;

// Re-export main types for easier imports
pub use app_config::AppConfig;
pub use dispatcher_worker::{CheckerSourceKind, DispatcherConfig, SchedulerConfig, WorkerConfig};
pub use infrastructure::{ElectionBackend, ElectionConfig, NodeConfig, RedisConfig};
pub use observability::{LogFormat, ObservabilityConfig};
