//! 领域事件
//!
//! Dispatcher 与 Worker 层之间唯一的通信单元，以及集群成员变更通知。

use serde::{Deserialize, Serialize};

use crate::entities::{Checker, Node};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventAction {
    Add,
    Update,
    Delete,
}

impl EventAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventAction::Add => "add",
            EventAction::Update => "update",
            EventAction::Delete => "delete",
        }
    }
}

/// 拨测变更事件，由一次diff产生，只被消费一次
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub action: EventAction,
    /// Delete 事件携带最后一次已知的定义
    pub data: Checker,
}

impl Event {
    pub fn add(data: Checker) -> Self {
        Self {
            action: EventAction::Add,
            data,
        }
    }

    pub fn update(data: Checker) -> Self {
        Self {
            action: EventAction::Update,
            data,
        }
    }

    pub fn delete(data: Checker) -> Self {
        Self {
            action: EventAction::Delete,
            data,
        }
    }

    pub fn checker_id(&self) -> i64 {
        self.data.id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeAction {
    Add,
    Delete,
}

/// 集群成员变更通知
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeEvent {
    pub action: NodeAction,
    pub node: Node,
}

impl NodeEvent {
    pub fn joined(node: Node) -> Self {
        Self {
            action: NodeAction::Add,
            node,
        }
    }

    pub fn left(node: Node) -> Self {
        Self {
            action: NodeAction::Delete,
            node,
        }
    }
}
