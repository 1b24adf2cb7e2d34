use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use checker_core::CheckerResult;
use checker_domain::{Election, IdSet, Node, ScheduleStorage};

struct Entry {
    ids: IdSet,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| deadline <= now)
    }
}

/// 进程内的分配集合存储
///
/// 语义与Redis实现一致：空集合即删除键，设置过TTL的键到期后视为空，
/// 对已存在的键执行add不会清除TTL。用于单进程模式和测试。
pub struct InMemoryScheduleStorage {
    election: Arc<dyn Election>,
    sets: Mutex<HashMap<String, Entry>>,
    mutations: AtomicU64,
}

impl InMemoryScheduleStorage {
    pub fn new(election: Arc<dyn Election>) -> Self {
        Self {
            election,
            sets: Mutex::new(HashMap::new()),
            mutations: AtomicU64::new(0),
        }
    }

    /// 累计的写操作次数（add/del/remove_node）
    pub fn mutations(&self) -> u64 {
        self.mutations.load(Ordering::SeqCst)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        let mut sets = self.sets.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        sets.retain(|_, entry| !entry.is_expired(now));
        sets
    }
}

#[async_trait]
impl ScheduleStorage for InMemoryScheduleStorage {
    async fn nodes(&self) -> CheckerResult<Vec<Node>> {
        self.election.nodes().await
    }

    async fn nodes_keep_alive(&self, nodes: &[Node], ttl: Duration) -> CheckerResult<()> {
        let mut sets = self.lock();
        let deadline = Instant::now() + ttl;
        for node in nodes {
            if let Some(entry) = sets.get_mut(&node.id) {
                entry.expires_at = Some(deadline);
            }
        }
        Ok(())
    }

    async fn remove_node(&self, node_id: &str) -> CheckerResult<()> {
        self.mutations.fetch_add(1, Ordering::SeqCst);
        self.lock().remove(node_id);
        Ok(())
    }

    async fn get(&self, node_id: &str) -> CheckerResult<IdSet> {
        Ok(self
            .lock()
            .get(node_id)
            .map(|entry| entry.ids.clone())
            .unwrap_or_default())
    }

    async fn add(&self, node_id: &str, id: i64) -> CheckerResult<()> {
        self.mutations.fetch_add(1, Ordering::SeqCst);
        self.lock()
            .entry(node_id.to_string())
            .or_insert_with(|| Entry {
                ids: IdSet::new(),
                expires_at: None,
            })
            .ids
            .insert(id);
        Ok(())
    }

    async fn del(&self, node_id: &str, id: i64) -> CheckerResult<()> {
        self.mutations.fetch_add(1, Ordering::SeqCst);
        let mut sets = self.lock();
        if let Some(entry) = sets.get_mut(node_id) {
            entry.ids.remove(&id);
            if entry.ids.is_empty() {
                sets.remove(node_id);
            }
        }
        Ok(())
    }

    async fn for_each(
        &self,
        node_id: &str,
        f: &mut (dyn FnMut(i64) -> bool + Send),
    ) -> CheckerResult<()> {
        let ids = self.get(node_id).await?;
        for id in ids {
            if !f(id) {
                break;
            }
        }
        Ok(())
    }
}
