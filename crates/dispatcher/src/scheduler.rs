use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, watch, Mutex};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use checker_core::config::SchedulerConfig;
use checker_core::CheckerResult;
use checker_domain::{CheckerSource, IdSet, ScheduleStorage};
use checker_infrastructure::{MetricsCollector, StructuredLogger};

use crate::dispatcher::wait_changed;

/// 一次调度的结果摘要
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulePass {
    /// 重复或孤立而被删除的分配
    pub removed: usize,
    /// 再平衡时从超额节点释放的分配
    pub released: usize,
    /// 新写入的分配
    pub assigned: usize,
    /// 调度后每个存活节点持有的拨测数量
    pub assignments: BTreeMap<String, usize>,
}

impl SchedulePass {
    /// 本次调度对存储的写操作数（不含保活）
    pub fn mutations(&self) -> usize {
        self.removed + self.released + self.assigned
    }

    pub fn total(&self) -> usize {
        self.assignments.values().sum()
    }
}

/// 供成员监听任务使用的调度触发句柄
#[derive(Clone)]
pub struct RescheduleHandle {
    trigger: mpsc::Sender<()>,
    storage: Arc<dyn ScheduleStorage>,
}

impl RescheduleHandle {
    /// 请求一次额外调度；两次调度之间的多次请求合并为一次
    pub fn reschedule(&self) {
        if self.trigger.try_send(()).is_err() {
            debug!("Reschedule already pending");
        }
    }

    /// 删除节点的分配集合，其拨测在下一次调度中重新分配
    pub async fn remove_node(&self, node_id: &str) -> CheckerResult<()> {
        info!("Removing schedule of node {}", node_id);
        self.storage.remove_node(node_id).await
    }
}

/// 拨测分配调度器，仅在Leader节点运行
///
/// 每次调度从存储重建视图：先清理重复和孤立的分配，再（可选）释放超额分配，
/// 最后把未分配的拨测交给负载最低的节点。调度器自身不持有持久状态，
/// 新Leader可以直接从存储继续。
pub struct Scheduler {
    storage: Arc<dyn ScheduleStorage>,
    source: Arc<dyn CheckerSource>,
    config: SchedulerConfig,
    metrics: Arc<MetricsCollector>,
    trigger: mpsc::Sender<()>,
    triggered: Mutex<mpsc::Receiver<()>>,
}

impl Scheduler {
    pub fn new(
        storage: Arc<dyn ScheduleStorage>,
        source: Arc<dyn CheckerSource>,
        config: SchedulerConfig,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        let (trigger, triggered) = mpsc::channel(1);
        Self {
            storage,
            source,
            config,
            metrics,
            trigger,
            triggered: Mutex::new(triggered),
        }
    }

    pub fn handle(&self) -> RescheduleHandle {
        RescheduleHandle {
            trigger: self.trigger.clone(),
            storage: self.storage.clone(),
        }
    }

    pub fn reschedule(&self) {
        self.handle().reschedule();
    }

    pub async fn remove_node(&self, node_id: &str) -> CheckerResult<()> {
        self.handle().remove_node(node_id).await
    }

    /// 调度循环：立即执行一次，之后由定时器、调度请求或定义源变更触发，直到取消
    pub async fn run(&self, cancel: CancellationToken) {
        info!(
            "Scheduler started, max schedule interval {:?}",
            self.config.max_schedule_interval
        );
        let mut triggered = self.triggered.lock().await;
        let mut changes = self.source.changes();

        loop {
            if let Err(e) = self.schedule().await {
                self.metrics.record_schedule_failure();
                StructuredLogger::log_system_error("scheduler", "schedule", &e);
            }
            if !self.wait_next(&mut triggered, &mut changes, &cancel).await {
                break;
            }
        }

        info!("Scheduler stopped");
    }

    /// 等待下一次调度的触发，取消时返回false
    async fn wait_next(
        &self,
        triggered: &mut mpsc::Receiver<()>,
        changes: &mut Option<watch::Receiver<u64>>,
        cancel: &CancellationToken,
    ) -> bool {
        let deadline = sleep(self.config.max_schedule_interval);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return false,
                _ = &mut deadline => return true,
                Some(()) = triggered.recv() => {
                    debug!("Reschedule requested");
                    return true;
                }
                changed = wait_changed(changes) => match changed {
                    Ok(()) => {
                        debug!("Checker source changed, rescheduling");
                        return true;
                    }
                    Err(_) => {
                        debug!("Checker source change signal closed");
                        *changes = None;
                    }
                },
            }
        }
    }

    /// 执行一次调度
    pub async fn schedule(&self) -> CheckerResult<SchedulePass> {
        let start = Instant::now();

        let mut nodes = self.storage.nodes().await?;
        nodes.sort();
        nodes.dedup();
        if nodes.is_empty() {
            warn!("No live nodes, skipping schedule pass");
            return Ok(SchedulePass::default());
        }

        let all_ids: IdSet = self.source.list_ids().await?.into_iter().collect();
        let mut pass = SchedulePass::default();

        // 清理：按节点ID、拨测ID升序遍历，先出现的节点保留重复的拨测
        let mut claimed = IdSet::new();
        let mut assigned: BTreeMap<String, IdSet> = BTreeMap::new();
        for node in &nodes {
            let persisted = self.storage.get(&node.id).await?;
            let mut kept = IdSet::new();
            for id in persisted {
                if !all_ids.contains(&id) || claimed.contains(&id) {
                    self.storage.del(&node.id, id).await?;
                    pass.removed += 1;
                    debug!("Removed duplicate or orphan checker {} from node {}", id, node);
                } else {
                    claimed.insert(id);
                    kept.insert(id);
                }
            }
            assigned.insert(node.id.clone(), kept);
        }

        if self.config.rebalance {
            for (node_id, id) in plan_release(&assigned, all_ids.len()) {
                self.storage.del(&node_id, id).await?;
                if let Some(ids) = assigned.get_mut(&node_id) {
                    ids.remove(&id);
                }
                claimed.remove(&id);
                pass.released += 1;
                debug!("Released checker {} from overloaded node {}", id, node_id);
            }
        }

        let unassigned: Vec<i64> = all_ids.difference(&claimed).copied().collect();
        for id in unassigned {
            let Some(node_id) = least_loaded(&assigned) else {
                break;
            };
            self.storage.add(&node_id, id).await?;
            if let Some(ids) = assigned.get_mut(&node_id) {
                ids.insert(id);
            }
            pass.assigned += 1;
        }

        self.storage
            .nodes_keep_alive(&nodes, self.config.keep_alive_ttl())
            .await?;

        pass.assignments = assigned
            .iter()
            .map(|(node_id, ids)| (node_id.clone(), ids.len()))
            .collect();
        for (node_id, count) in &pass.assignments {
            self.metrics.update_node_assignment(node_id, *count);
        }
        let elapsed = start.elapsed();
        self.metrics.record_schedule_pass(all_ids.len(), elapsed);
        StructuredLogger::log_schedule_pass(
            all_ids.len(),
            nodes.len(),
            pass.assigned,
            pass.released + pass.removed,
            elapsed,
        );

        Ok(pass)
    }
}

/// 负载最低的节点，负载相同时取ID最小者
fn least_loaded(assigned: &BTreeMap<String, IdSet>) -> Option<String> {
    assigned
        .iter()
        .min_by_key(|(_, ids)| ids.len())
        .map(|(node_id, _)| node_id.clone())
}

/// 计算再平衡需要释放的分配
///
/// N个拨测、M个节点时，最多 `N mod M` 个节点可以保留 `N/M + 1` 个，
/// 其余节点最多保留 `N/M` 个。超出部分从ID最大的开始释放。
/// 已经均衡的分配不会释放任何拨测。
fn plan_release(assigned: &BTreeMap<String, IdSet>, total: usize) -> Vec<(String, i64)> {
    if assigned.is_empty() {
        return Vec::new();
    }
    let floor = total / assigned.len();
    let mut extra = total % assigned.len();

    let mut order: Vec<(&String, &IdSet)> = assigned.iter().collect();
    order.sort_by(|a, b| b.1.len().cmp(&a.1.len()).then_with(|| a.0.cmp(b.0)));

    let mut release = Vec::new();
    for (node_id, ids) in order {
        let cap = if extra > 0 && ids.len() > floor {
            extra -= 1;
            floor + 1
        } else {
            floor
        };
        if ids.len() > cap {
            release.extend(
                ids.iter()
                    .rev()
                    .take(ids.len() - cap)
                    .map(|id| (node_id.clone(), *id)),
            );
        }
    }
    release
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::FlakySource;
    use checker_domain::Checker;
    use checker_infrastructure::{InMemoryScheduleStorage, LocalElection, StaticCheckerSource};
    use std::time::Duration;

    fn assignment(entries: &[(&str, &[i64])]) -> BTreeMap<String, IdSet> {
        entries
            .iter()
            .map(|(node, ids)| (node.to_string(), ids.iter().copied().collect()))
            .collect()
    }

    #[test]
    fn test_least_loaded_prefers_lowest_id_on_tie() {
        let assigned = assignment(&[("b", &[1]), ("a", &[2]), ("c", &[3, 4])]);
        assert_eq!(least_loaded(&assigned).as_deref(), Some("a"));
        assert_eq!(least_loaded(&BTreeMap::new()), None);
    }

    #[test]
    fn test_plan_release_balanced_is_empty() {
        let assigned = assignment(&[("a", &[1, 2, 3, 4]), ("b", &[5, 6, 7]), ("c", &[8, 9, 10])]);
        assert!(plan_release(&assigned, 10).is_empty());
    }

    #[test]
    fn test_plan_release_after_join() {
        // 新节点c加入，a、b各持有5个
        let assigned = assignment(&[("a", &[1, 2, 3, 4, 5]), ("b", &[6, 7, 8, 9, 10]), ("c", &[])]);
        let release = plan_release(&assigned, 10);
        // a 保留4个（允许一个节点多1个），b 保留3个
        assert_eq!(
            release,
            vec![
                ("a".to_string(), 5),
                ("b".to_string(), 10),
                ("b".to_string(), 9),
            ]
        );
    }

    #[test]
    fn test_plan_release_more_nodes_than_checkers() {
        let assigned = assignment(&[("a", &[1, 2]), ("b", &[]), ("c", &[])]);
        assert_eq!(plan_release(&assigned, 2), vec![("a".to_string(), 2)]);
    }

    #[test]
    fn test_schedule_pass_counters() {
        let pass = SchedulePass {
            removed: 1,
            released: 2,
            assigned: 3,
            assignments: BTreeMap::from([("a".to_string(), 4), ("b".to_string(), 5)]),
        };
        assert_eq!(pass.mutations(), 6);
        assert_eq!(pass.total(), 9);
    }

    #[tokio::test]
    async fn test_source_failure_aborts_pass_without_mutation() {
        let storage = Arc::new(InMemoryScheduleStorage::new(Arc::new(LocalElection::single("a"))));
        let source = Arc::new(FlakySource::new(Arc::new(
            StaticCheckerSource::new(vec![Checker::new(1, "a", "http")]).unwrap(),
        )));
        let scheduler = Scheduler::new(
            storage.clone(),
            source.clone(),
            SchedulerConfig::default(),
            Arc::new(MetricsCollector::new()),
        );

        source.set_failing(true);
        assert!(scheduler.schedule().await.is_err());
        assert_eq!(storage.mutations(), 0);

        source.set_failing(false);
        let pass = scheduler.schedule().await.unwrap();
        assert_eq!(pass.assigned, 1);
        assert_eq!(storage.get("a").await.unwrap(), IdSet::from([1]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_triggers_pass_without_request() {
        let storage = Arc::new(InMemoryScheduleStorage::new(Arc::new(LocalElection::single("a"))));
        let definitions = Arc::new(StaticCheckerSource::new(vec![Checker::new(1, "a", "http")]).unwrap());
        // FlakySource 不转发变更信号，新定义只能由定时器调度
        let source = Arc::new(FlakySource::new(definitions.clone()));
        let config = SchedulerConfig {
            max_schedule_interval: Duration::from_secs(60),
            ..SchedulerConfig::default()
        };
        let scheduler = Arc::new(Scheduler::new(
            storage.clone(),
            source,
            config,
            Arc::new(MetricsCollector::new()),
        ));

        let cancel = CancellationToken::new();
        let handle = {
            let scheduler = scheduler.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { scheduler.run(cancel).await })
        };

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(storage.get("a").await.unwrap(), IdSet::from([1]));

        definitions.put(Checker::new(2, "b", "http"));
        tokio::time::sleep(Duration::from_secs(58)).await;
        assert_eq!(storage.get("a").await.unwrap(), IdSet::from([1]));

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(storage.get("a").await.unwrap(), IdSet::from([1, 2]));

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_source_change_triggers_pass() {
        let storage = Arc::new(InMemoryScheduleStorage::new(Arc::new(LocalElection::single("a"))));
        let source = Arc::new(StaticCheckerSource::empty());
        let scheduler = Arc::new(Scheduler::new(
            storage.clone(),
            source.clone(),
            SchedulerConfig::default(),
            Arc::new(MetricsCollector::new()),
        ));

        let cancel = CancellationToken::new();
        let handle = {
            let scheduler = scheduler.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { scheduler.run(cancel).await })
        };
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(storage.get("a").await.unwrap().is_empty());

        source.put(Checker::new(5, "e", "http"));
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(storage.get("a").await.unwrap(), IdSet::from([5]));

        source.remove(5);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(storage.get("a").await.unwrap().is_empty());

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_reschedule_requests_coalesce() {
        let storage = Arc::new(InMemoryScheduleStorage::new(Arc::new(LocalElection::single("a"))));
        let scheduler = Scheduler::new(
            storage,
            Arc::new(StaticCheckerSource::empty()),
            SchedulerConfig::default(),
            Arc::new(MetricsCollector::new()),
        );
        let handle = scheduler.handle();
        handle.reschedule();
        handle.reschedule();
        scheduler.reschedule();

        let mut triggered = scheduler.triggered.lock().await;
        assert!(triggered.try_recv().is_ok());
        assert!(triggered.try_recv().is_err());
    }
}
