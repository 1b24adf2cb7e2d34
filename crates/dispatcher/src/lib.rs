//! Checker dispatching
//!
//! - `scheduler`：Leader节点上的分配调度
//! - `leader`：领导权状态机与成员监听
//! - `dispatcher`：每个节点把分配结果转换为拨测事件
//! - `lister`：Dispatcher读取本节点拨测定义的方式

pub mod dispatcher;
pub mod leader;
pub mod lister;
pub mod scheduler;

#[cfg(test)]
pub mod test_utils;

pub use dispatcher::Dispatcher;
pub use leader::LeaderRole;
pub use lister::{AssignedCheckerLister, CheckerLister};
pub use scheduler::{RescheduleHandle, SchedulePass, Scheduler};
