use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use checker_domain::{Election, NodeAction, NodeEvent};

use crate::scheduler::{RescheduleHandle, Scheduler};

enum Role {
    Follower,
    Leader {
        cancel: CancellationToken,
        tasks: Vec<JoinHandle<()>>,
    },
}

/// 领导权状态机
///
/// 成为Leader时启动调度循环和成员监听，失去领导权时取消二者并等待退出。
/// 调度结果全部持久化在存储中，交接时不需要额外清理。
pub struct LeaderRole {
    election: Arc<dyn Election>,
    scheduler: Arc<Scheduler>,
    leading: AtomicBool,
}

impl LeaderRole {
    pub fn new(election: Arc<dyn Election>, scheduler: Arc<Scheduler>) -> Self {
        Self {
            election,
            scheduler,
            leading: AtomicBool::new(false),
        }
    }

    pub fn is_leading(&self) -> bool {
        self.leading.load(Ordering::SeqCst)
    }

    pub async fn run(&self, cancel: CancellationToken) {
        let node = self.election.node();
        let mut leadership = self.election.leadership();
        let mut role = Role::Follower;
        info!("Leader role watcher started for node {}", node);

        loop {
            let is_leader = *leadership.borrow_and_update();
            role = self.transition(role, is_leader, &cancel).await;

            tokio::select! {
                _ = cancel.cancelled() => break,
                changed = leadership.changed() => {
                    if changed.is_err() {
                        warn!("Leadership channel closed for node {}", node);
                        break;
                    }
                }
            }
        }

        self.transition(role, false, &cancel).await;
        info!("Leader role watcher stopped for node {}", node);
    }

    async fn transition(&self, role: Role, is_leader: bool, cancel: &CancellationToken) -> Role {
        match (role, is_leader) {
            (Role::Follower, true) => {
                let token = cancel.child_token();
                // 先订阅再启动，避免漏掉交接期间的成员变更
                let events = self.election.watch_nodes();
                let scheduler = self.scheduler.clone();
                let scheduler_token = token.clone();
                let tasks = vec![
                    tokio::spawn(async move { scheduler.run(scheduler_token).await }),
                    tokio::spawn(watch_membership(
                        events,
                        self.scheduler.handle(),
                        token.clone(),
                    )),
                ];
                self.leading.store(true, Ordering::SeqCst);
                info!("Entered leader role");
                Role::Leader {
                    cancel: token,
                    tasks,
                }
            }
            (Role::Leader { cancel, tasks }, false) => {
                cancel.cancel();
                for task in tasks {
                    if let Err(e) = task.await {
                        warn!("Leader task terminated abnormally: {}", e);
                    }
                }
                self.leading.store(false, Ordering::SeqCst);
                info!("Left leader role");
                Role::Follower
            }
            (role, _) => role,
        }
    }
}

/// 成员离开时删除其分配并触发调度，加入时触发调度
async fn watch_membership(
    mut events: broadcast::Receiver<NodeEvent>,
    handle: RescheduleHandle,
    cancel: CancellationToken,
) {
    loop {
        let received = tokio::select! {
            _ = cancel.cancelled() => return,
            received = events.recv() => received,
        };

        match received {
            Ok(event) => {
                debug!("Membership event {:?} for node {}", event.action, event.node);
                if event.action == NodeAction::Delete {
                    if let Err(e) = handle.remove_node(&event.node.id).await {
                        warn!("Failed to remove schedule of node {}: {}", event.node, e);
                    }
                }
                handle.reschedule();
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!("Membership watcher lagged by {} events, rescheduling", skipped);
                handle.reschedule();
            }
            Err(RecvError::Closed) => {
                warn!("Membership channel closed");
                return;
            }
        }
    }
}
