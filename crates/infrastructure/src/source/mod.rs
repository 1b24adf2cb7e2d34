//! 拨测定义源实现

pub mod redis_source;
pub mod static_source;

pub use redis_source::RedisCheckerSource;
pub use static_source::StaticCheckerSource;
