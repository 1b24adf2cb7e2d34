//! 配置管理
//!
//! 配置按 默认值 -> TOML文件 -> 环境变量(`CHECKER__SECTION__KEY`) 的顺序叠加，
//! 时长字段统一使用人类可读格式（`30s`、`1m`、`1m30s`）。

pub mod duration;
pub mod models;

pub use duration::{format_duration, parse_duration};
pub use models::*;
