//! 节点分配集合存储实现

pub mod memory;
pub mod redis_storage;

pub use memory::InMemoryScheduleStorage;
pub use redis_storage::RedisScheduleStorage;
