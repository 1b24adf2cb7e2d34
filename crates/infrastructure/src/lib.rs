pub mod election;
pub mod observability;
pub mod redis_client;
pub mod sink;
pub mod source;
pub mod storage;

pub use election::{LocalCluster, LocalElection, RedisElection};
pub use observability::*;
pub use redis_client::RedisConnectionManager;
pub use sink::JsonLinesSink;
pub use source::{RedisCheckerSource, StaticCheckerSource};
pub use storage::{InMemoryScheduleStorage, RedisScheduleStorage};
