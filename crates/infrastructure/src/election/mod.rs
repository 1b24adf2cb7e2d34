//! 选主与成员服务实现

pub mod local;
pub mod redis_election;

pub use local::{LocalCluster, LocalElection};
pub use redis_election::RedisElection;
