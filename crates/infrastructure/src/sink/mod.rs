//! 拨测结果接收端实现

pub mod json_lines;

pub use json_lines::JsonLinesSink;
