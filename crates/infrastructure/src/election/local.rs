use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::{broadcast, watch};
use tracing::debug;

use checker_core::CheckerResult;
use checker_domain::{Election, Node, NodeEvent};

const EVENT_CAPACITY: usize = 64;

/// 进程内的集群
///
/// 成员按ID排序，ID最小的成员为Leader。用于单节点部署，
/// 也用于在一个进程中模拟多节点集群的测试。
#[derive(Clone)]
pub struct LocalCluster {
    members: Arc<Mutex<BTreeMap<String, Arc<watch::Sender<bool>>>>>,
    events: broadcast::Sender<NodeEvent>,
}

impl Default for LocalCluster {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalCluster {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            members: Arc::new(Mutex::new(BTreeMap::new())),
            events,
        }
    }

    /// 加入集群；同一ID重复加入时复用已有的领导权通道
    pub fn join(&self, node_id: impl Into<String>) -> LocalElection {
        let node_id = node_id.into();
        let (sender, joined) = {
            let mut members = self.lock();
            match members.get(&node_id) {
                Some(sender) => (sender.clone(), false),
                None => {
                    let (tx, _) = watch::channel(false);
                    let sender = Arc::new(tx);
                    members.insert(node_id.clone(), sender.clone());
                    Self::elect(&members);
                    (sender, true)
                }
            }
        };

        if joined {
            debug!("Node {} joined local cluster", node_id);
            let _ = self.events.send(NodeEvent::joined(Node::new(node_id.clone())));
        }

        LocalElection {
            node: Node::new(node_id),
            cluster: self.clone(),
            leadership: sender,
        }
    }

    /// 离开集群，若离开的是Leader则由剩余成员中ID最小者接任
    pub fn leave(&self, node_id: &str) {
        let removed = {
            let mut members = self.lock();
            let removed = members.remove(node_id);
            if let Some(sender) = &removed {
                sender.send_replace(false);
                Self::elect(&members);
            }
            removed.is_some()
        };

        if removed {
            debug!("Node {} left local cluster", node_id);
            let _ = self.events.send(NodeEvent::left(Node::new(node_id)));
        }
    }

    pub fn members(&self) -> Vec<Node> {
        self.lock().keys().map(Node::new).collect()
    }

    fn elect(members: &BTreeMap<String, Arc<watch::Sender<bool>>>) {
        for (index, sender) in members.values().enumerate() {
            let is_leader = index == 0;
            sender.send_if_modified(|current| {
                if *current == is_leader {
                    false
                } else {
                    *current = is_leader;
                    true
                }
            });
        }
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, Arc<watch::Sender<bool>>>> {
        self.members.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// 本地集群中某个成员的视角
#[derive(Clone)]
pub struct LocalElection {
    node: Node,
    cluster: LocalCluster,
    leadership: Arc<watch::Sender<bool>>,
}

impl LocalElection {
    /// 单节点集群，本节点立即成为Leader
    pub fn single(node_id: impl Into<String>) -> Self {
        LocalCluster::new().join(node_id)
    }

    pub fn cluster(&self) -> &LocalCluster {
        &self.cluster
    }

    pub fn leave(&self) {
        self.cluster.leave(&self.node.id);
    }
}

#[async_trait]
impl Election for LocalElection {
    fn node(&self) -> Node {
        self.node.clone()
    }

    async fn nodes(&self) -> CheckerResult<Vec<Node>> {
        Ok(self.cluster.members())
    }

    fn leadership(&self) -> watch::Receiver<bool> {
        self.leadership.subscribe()
    }

    fn watch_nodes(&self) -> broadcast::Receiver<NodeEvent> {
        self.cluster.events.subscribe()
    }
}
