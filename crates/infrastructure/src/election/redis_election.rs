use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use redis::Script;
use tokio::sync::{broadcast, watch};
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use checker_core::config::ElectionConfig;
use checker_core::CheckerResult;
use checker_domain::{Election, Node, NodeEvent};

use crate::observability::StructuredLogger;
use crate::redis_client::RedisConnectionManager;

const EVENT_CAPACITY: usize = 64;
const SCAN_BATCH: usize = 100;

const RENEW_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('PEXPIRE', KEYS[1], ARGV[2])
end
return 0
"#;

const RELEASE_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
end
return 0
"#;

/// 基于Redis租约的选主与成员发现
///
/// - 成员：每个节点定期写入 `<prefix>:node:<id>`（带TTL），存活节点即未过期的键
/// - Leader：`<prefix>:leader` 以 `SET NX PX` 抢占，持有者定期续约
///
/// 与Redis通信失败时本节点立即放弃领导权，租约过期前其他节点无法接任，
/// 因此同一时刻至多一个Leader。
pub struct RedisElection {
    node: Node,
    connection: RedisConnectionManager,
    key_prefix: String,
    lease_ttl: Duration,
    heartbeat_interval: Duration,
    leadership: watch::Sender<bool>,
    events: broadcast::Sender<NodeEvent>,
    members: Mutex<BTreeSet<String>>,
}

impl RedisElection {
    pub fn new(
        connection: RedisConnectionManager,
        node_id: impl Into<String>,
        config: &ElectionConfig,
    ) -> Self {
        let (leadership, _) = watch::channel(false);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            node: Node::new(node_id),
            connection,
            key_prefix: config.key_prefix.clone(),
            lease_ttl: config.lease_ttl,
            heartbeat_interval: config.heartbeat_interval,
            leadership,
            events,
            members: Mutex::new(BTreeSet::new()),
        }
    }

    fn node_key(&self, node_id: &str) -> String {
        format!("{}:node:{}", self.key_prefix, node_id)
    }

    fn leader_key(&self) -> String {
        format!("{}:leader", self.key_prefix)
    }

    pub fn is_leader(&self) -> bool {
        *self.leadership.borrow()
    }

    /// 心跳循环，直到取消；退出前释放租约并注销本节点
    pub async fn run(&self, cancel: CancellationToken) {
        info!("Starting redis election for node {}", self.node);
        let mut ticker = interval(self.heartbeat_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.heartbeat().await {
                        warn!("Election heartbeat failed for node {}: {}", self.node, e);
                        self.set_leader(false);
                    }
                }
            }
        }

        if let Err(e) = self.resign().await {
            warn!("Failed to resign node {} cleanly: {}", self.node, e);
        }
        info!("Redis election for node {} stopped", self.node);
    }

    /// 一次心跳：注册自身、抢占或续约租约、刷新成员列表
    pub async fn heartbeat(&self) -> CheckerResult<()> {
        let ttl_ms = self.lease_ttl.as_millis() as u64;

        let mut register = redis::cmd("SET");
        register
            .arg(self.node_key(&self.node.id))
            .arg(&self.node.id)
            .arg("PX")
            .arg(ttl_ms);
        let _: String = self.connection.execute_command(&mut register).await?;

        let leader = if self.is_leader() {
            self.renew_lease(ttl_ms).await? || self.acquire_lease(ttl_ms).await?
        } else {
            self.acquire_lease(ttl_ms).await?
        };
        self.set_leader(leader);

        self.refresh_members().await
    }

    async fn acquire_lease(&self, ttl_ms: u64) -> CheckerResult<bool> {
        let mut cmd = redis::cmd("SET");
        cmd.arg(self.leader_key())
            .arg(&self.node.id)
            .arg("NX")
            .arg("PX")
            .arg(ttl_ms);
        let reply: Option<String> = self.connection.execute_command(&mut cmd).await?;
        Ok(reply.is_some())
    }

    async fn renew_lease(&self, ttl_ms: u64) -> CheckerResult<bool> {
        let mut conn = self.connection.connection();
        let renewed: i64 = Script::new(RENEW_SCRIPT)
            .key(self.leader_key())
            .arg(&self.node.id)
            .arg(ttl_ms)
            .invoke_async(&mut conn)
            .await?;
        Ok(renewed == 1)
    }

    async fn resign(&self) -> CheckerResult<()> {
        self.set_leader(false);
        let mut conn = self.connection.connection();
        let _: i64 = Script::new(RELEASE_SCRIPT)
            .key(self.leader_key())
            .arg(&self.node.id)
            .invoke_async(&mut conn)
            .await?;

        let mut cmd = redis::cmd("DEL");
        cmd.arg(self.node_key(&self.node.id));
        let _: i64 = self.connection.execute_command(&mut cmd).await?;
        Ok(())
    }

    async fn scan_members(&self) -> CheckerResult<BTreeSet<String>> {
        let prefix = self.node_key("");
        let pattern = format!("{prefix}*");
        let mut members = BTreeSet::new();
        let mut cursor: u64 = 0;
        loop {
            let mut cmd = redis::cmd("SCAN");
            cmd.arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH);
            let (next, keys): (u64, Vec<String>) = self.connection.execute_command(&mut cmd).await?;
            members.extend(
                keys.into_iter()
                    .filter_map(|key| key.strip_prefix(&prefix).map(str::to_string))
                    .filter(|id| !id.is_empty()),
            );
            if next == 0 {
                return Ok(members);
            }
            cursor = next;
        }
    }

    async fn refresh_members(&self) -> CheckerResult<()> {
        let current = self.scan_members().await?;
        let events = {
            let mut known = self.lock_members();
            let joined = current
                .difference(&known)
                .map(|id| NodeEvent::joined(Node::new(id.as_str())));
            let left = known
                .difference(&current)
                .map(|id| NodeEvent::left(Node::new(id.as_str())));
            let events: Vec<NodeEvent> = joined.chain(left).collect();
            *known = current;
            events
        };

        for event in events {
            StructuredLogger::log_node_event(&event);
            let _ = self.events.send(event);
        }
        Ok(())
    }

    fn set_leader(&self, leader: bool) {
        let changed = self.leadership.send_if_modified(|current| {
            if *current == leader {
                false
            } else {
                *current = leader;
                true
            }
        });
        if changed {
            StructuredLogger::log_leadership_change(&self.node.id, leader);
        } else {
            debug!("Node {} leadership unchanged: {}", self.node, leader);
        }
    }

    fn lock_members(&self) -> MutexGuard<'_, BTreeSet<String>> {
        self.members.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl Election for RedisElection {
    fn node(&self) -> Node {
        self.node.clone()
    }

    async fn nodes(&self) -> CheckerResult<Vec<Node>> {
        Ok(self
            .scan_members()
            .await?
            .into_iter()
            .map(Node::new)
            .collect())
    }

    fn leadership(&self) -> watch::Receiver<bool> {
        self.leadership.subscribe()
    }

    fn watch_nodes(&self) -> broadcast::Receiver<NodeEvent> {
        self.events.subscribe()
    }
}
