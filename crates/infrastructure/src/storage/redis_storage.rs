use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::debug;

use checker_core::CheckerResult;
use checker_domain::{Election, IdSet, Node, ScheduleStorage};

use crate::observability::MetricsCollector;
use crate::redis_client::RedisConnectionManager;

const SCAN_BATCH: usize = 500;

/// 基于Redis集合的分配存储
///
/// 每个节点一个SET：`<prefix>:schedule:<node_id>`，成员为拨测ID。
/// 单条命令在单个键上原子执行，跨键不使用事务。
pub struct RedisScheduleStorage {
    connection: RedisConnectionManager,
    election: Arc<dyn Election>,
    key_prefix: String,
    metrics: Arc<MetricsCollector>,
}

impl RedisScheduleStorage {
    pub fn new(
        connection: RedisConnectionManager,
        election: Arc<dyn Election>,
        key_prefix: impl Into<String>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            connection,
            election,
            key_prefix: key_prefix.into(),
            metrics,
        }
    }

    pub fn schedule_key(&self, node_id: &str) -> String {
        format!("{}:schedule:{}", self.key_prefix, node_id)
    }
}

#[async_trait]
impl ScheduleStorage for RedisScheduleStorage {
    async fn nodes(&self) -> CheckerResult<Vec<Node>> {
        self.election.nodes().await
    }

    async fn nodes_keep_alive(&self, nodes: &[Node], ttl: Duration) -> CheckerResult<()> {
        if nodes.is_empty() {
            return Ok(());
        }
        let start = Instant::now();
        let ttl_ms = ttl.as_millis() as u64;
        let mut pipe = redis::pipe();
        for node in nodes {
            pipe.cmd("PEXPIRE")
                .arg(self.schedule_key(&node.id))
                .arg(ttl_ms)
                .ignore();
        }
        self.connection.execute_pipeline(&mut pipe).await?;
        self.metrics
            .record_storage_operation("nodes_keep_alive", start.elapsed());
        debug!("Refreshed TTL of {} schedule keys to {:?}", nodes.len(), ttl);
        Ok(())
    }

    async fn remove_node(&self, node_id: &str) -> CheckerResult<()> {
        let start = Instant::now();
        let mut cmd = redis::cmd("DEL");
        cmd.arg(self.schedule_key(node_id));
        let _: i64 = self.connection.execute_command(&mut cmd).await?;
        self.metrics.record_storage_operation("remove_node", start.elapsed());
        Ok(())
    }

    async fn get(&self, node_id: &str) -> CheckerResult<IdSet> {
        let start = Instant::now();
        let mut cmd = redis::cmd("SMEMBERS");
        cmd.arg(self.schedule_key(node_id));
        let ids: Vec<i64> = self.connection.execute_command(&mut cmd).await?;
        self.metrics.record_storage_operation("get", start.elapsed());
        Ok(ids.into_iter().collect())
    }

    async fn add(&self, node_id: &str, id: i64) -> CheckerResult<()> {
        let start = Instant::now();
        let mut cmd = redis::cmd("SADD");
        cmd.arg(self.schedule_key(node_id)).arg(id);
        let _: i64 = self.connection.execute_command(&mut cmd).await?;
        self.metrics.record_storage_operation("add", start.elapsed());
        Ok(())
    }

    async fn del(&self, node_id: &str, id: i64) -> CheckerResult<()> {
        let start = Instant::now();
        let mut cmd = redis::cmd("SREM");
        cmd.arg(self.schedule_key(node_id)).arg(id);
        let _: i64 = self.connection.execute_command(&mut cmd).await?;
        self.metrics.record_storage_operation("del", start.elapsed());
        Ok(())
    }

    async fn for_each(
        &self,
        node_id: &str,
        f: &mut (dyn FnMut(i64) -> bool + Send),
    ) -> CheckerResult<()> {
        let key = self.schedule_key(node_id);
        let mut cursor: u64 = 0;
        loop {
            let mut cmd = redis::cmd("SSCAN");
            cmd.arg(&key)
                .arg(cursor)
                .arg("COUNT")
                .arg(SCAN_BATCH);
            let (next, batch): (u64, Vec<i64>) = self.connection.execute_command(&mut cmd).await?;
            for id in batch {
                if !f(id) {
                    return Ok(());
                }
            }
            if next == 0 {
                return Ok(());
            }
            cursor = next;
        }
    }
}
