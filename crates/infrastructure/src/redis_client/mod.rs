//! Redis连接管理

pub mod connection_manager;

pub use connection_manager::RedisConnectionManager;
