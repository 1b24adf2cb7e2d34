use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::sync::mpsc::error::{SendTimeoutError, TrySendError};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use checker_core::config::DispatcherConfig;
use checker_core::CheckerResult;
use checker_domain::{Checker, Event, EventAction};
use checker_infrastructure::{MetricsCollector, StructuredLogger};

use crate::lister::CheckerLister;

/// 一次diff产生的变更，附带缓存中的旧值以便投递失败时回滚
#[derive(Debug, Clone)]
struct Change {
    event: Event,
    previous: Option<Checker>,
}

/// 每个节点一个Dispatcher
///
/// 周期性地把“分配给本节点的拨测”与上一次的快照比较，
/// 将差异以 Add/Update/Delete 事件扇出给所有watcher。
/// 每个watcher是一个有界通道，投递超时的事件被丢弃，
/// 对应拨测的缓存回滚到投递前的状态，下一轮加载会重新产生同样的事件。
pub struct Dispatcher {
    lister: Arc<dyn CheckerLister>,
    changes: Option<watch::Receiver<u64>>,
    load_interval: Duration,
    event_buffer: usize,
    send_timeout: Duration,
    checkers: Mutex<HashMap<i64, Checker>>,
    loading: Mutex<()>,
    watchers: StdMutex<Vec<mpsc::Sender<Event>>>,
    metrics: Arc<MetricsCollector>,
}

impl Dispatcher {
    pub fn new(
        lister: Arc<dyn CheckerLister>,
        config: &DispatcherConfig,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            lister,
            changes: None,
            load_interval: config.load_checkers_interval,
            event_buffer: config.event_buffer,
            send_timeout: config.send_timeout,
            checkers: Mutex::new(HashMap::new()),
            loading: Mutex::new(()),
            watchers: StdMutex::new(Vec::new()),
            metrics,
        }
    }

    /// 订阅定义源的变更信号，收到信号后立即重新加载
    pub fn with_changes(mut self, changes: Option<watch::Receiver<u64>>) -> Self {
        self.changes = changes;
        self
    }

    /// 注册一个新的watcher，每次调用返回独立的通道
    pub fn watch(&self) -> mpsc::Receiver<Event> {
        let (tx, rx) = mpsc::channel(self.event_buffer);
        self.lock_watchers().push(tx);
        rx
    }

    pub async fn cached(&self, id: i64) -> Option<Checker> {
        self.checkers.lock().await.get(&id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.checkers.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.checkers.lock().await.is_empty()
    }

    pub async fn run(&self, cancel: CancellationToken) {
        info!("Dispatcher started, load interval {:?}", self.load_interval);
        let mut changes = self.changes.clone();
        let mut ticker = interval(self.load_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
                changed = wait_changed(&mut changes) => {
                    if changed.is_err() {
                        debug!("Checker source change signal closed");
                        changes = None;
                        continue;
                    }
                    debug!("Checker source changed, reloading");
                }
            }

            if let Err(e) = self.load().await {
                StructuredLogger::log_system_error("dispatcher", "load_checkers", &e);
            }
        }

        info!("Dispatcher stopped");
    }

    /// 加载一次并派发差异，返回成功投递的事件数
    ///
    /// 加载失败时缓存保持不变。投递期间不持有缓存锁；
    /// 某个watcher在本轮超时一次后即视为饱和，本轮剩余事件对它只做非阻塞投递，
    /// 因此一次加载最多等待一个 `send_timeout`。
    pub async fn load(&self) -> CheckerResult<usize> {
        let _loading = self.loading.lock().await;
        let current = match self.lister.list().await {
            Ok(current) => current,
            Err(e) => {
                self.metrics.record_load_failure();
                return Err(e);
            }
        };

        let changes = {
            let mut cache = self.checkers.lock().await;
            let changes = diff(&cache, &current);
            *cache = current;
            if changes.is_empty() {
                self.metrics.record_load(cache.len());
                return Ok(0);
            }
            changes
        };

        let watchers = self.lock_watchers().clone();
        let mut saturated = vec![false; watchers.len()];
        let mut dropped = Vec::new();
        let mut delivered = 0;
        for change in changes {
            if self.deliver(&change.event, &watchers, &mut saturated).await {
                self.metrics.record_event(change.event.action.as_str());
                delivered += 1;
            } else {
                dropped.push(change);
            }
        }

        if watchers.iter().any(|w| w.is_closed()) {
            let mut watchers = self.lock_watchers();
            watchers.retain(|w| !w.is_closed());
            debug!("Removed closed watchers, {} remaining", watchers.len());
        }

        let mut cache = self.checkers.lock().await;
        for change in dropped {
            revert(&mut cache, change);
        }
        self.metrics.record_load(cache.len());
        debug!("Dispatched {} events, {} checkers cached", delivered, cache.len());
        Ok(delivered)
    }

    /// 投递给所有watcher，任一watcher未接收即视为失败
    async fn deliver(
        &self,
        event: &Event,
        watchers: &[mpsc::Sender<Event>],
        saturated: &mut [bool],
    ) -> bool {
        StructuredLogger::log_checker_event(event);
        let mut delivered = true;

        for (watcher, saturated) in watchers.iter().zip(saturated.iter_mut()) {
            let result = if *saturated {
                watcher.try_send(event.clone()).map_err(|e| match e {
                    TrySendError::Full(event) => SendTimeoutError::Timeout(event),
                    TrySendError::Closed(event) => SendTimeoutError::Closed(event),
                })
            } else {
                watcher.send_timeout(event.clone(), self.send_timeout).await
            };
            match result {
                Ok(()) | Err(SendTimeoutError::Closed(_)) => {}
                Err(SendTimeoutError::Timeout(_)) => {
                    *saturated = true;
                    StructuredLogger::log_event_dropped(event, self.send_timeout);
                    self.metrics.record_event_dropped();
                    delivered = false;
                }
            }
        }
        delivered
    }

    fn lock_watchers(&self) -> std::sync::MutexGuard<'_, Vec<mpsc::Sender<Event>>> {
        self.watchers.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// 等待定义源的变更信号，未订阅时永不就绪
pub(crate) async fn wait_changed(
    changes: &mut Option<watch::Receiver<u64>>,
) -> Result<(), watch::error::RecvError> {
    match changes {
        Some(rx) => rx.changed().await,
        None => std::future::pending().await,
    }
}

/// 新旧快照的差异，按拨测ID升序
fn diff(previous: &HashMap<i64, Checker>, current: &HashMap<i64, Checker>) -> Vec<Change> {
    let mut changes = Vec::new();
    for (id, checker) in current {
        match previous.get(id) {
            None => changes.push(Change {
                event: Event::add(checker.clone()),
                previous: None,
            }),
            Some(old) if old != checker => changes.push(Change {
                event: Event::update(checker.clone()),
                previous: Some(old.clone()),
            }),
            Some(_) => {}
        }
    }
    for (id, old) in previous {
        if !current.contains_key(id) {
            changes.push(Change {
                event: Event::delete(old.clone()),
                previous: Some(old.clone()),
            });
        }
    }
    changes.sort_by_key(|c| c.event.checker_id());
    changes
}

fn revert(cache: &mut HashMap<i64, Checker>, change: Change) {
    let id = change.event.checker_id();
    match (change.event.action, change.previous) {
        (EventAction::Add, _) | (_, None) => {
            cache.remove(&id);
        }
        (EventAction::Update | EventAction::Delete, Some(previous)) => {
            cache.insert(id, previous);
        }
    }
}
