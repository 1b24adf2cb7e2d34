use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use checker_domain::Checker;
use checker_infrastructure::MetricsCollector;

use crate::worker::Worker;

struct Entry {
    worker: Arc<dyn Worker>,
    handle: JoinHandle<()>,
}

impl Entry {
    async fn stop(self) {
        self.worker.close().await;
        if let Err(e) = self.handle.await {
            warn!(
                "Worker for checker {} terminated abnormally: {}",
                self.worker.checker_id(),
                e
            );
        }
    }
}

/// 进程内的Worker注册表，保证每个拨测ID至多一个活跃的执行循环
///
/// 替换和删除都在持有锁的情况下等待旧循环完全退出，
/// 因此同一ID的新旧循环不会同时运行。
pub struct WorkerManager {
    root: CancellationToken,
    workers: Mutex<HashMap<i64, Entry>>,
    metrics: Arc<MetricsCollector>,
}

impl WorkerManager {
    /// `root` 取消时所有循环随之退出
    pub fn new(root: CancellationToken, metrics: Arc<MetricsCollector>) -> Self {
        Self {
            root,
            workers: Mutex::new(HashMap::new()),
            metrics,
        }
    }

    /// 启动worker，先关闭并等待同一ID的旧worker
    pub async fn put(&self, worker: Arc<dyn Worker>) {
        let id = worker.checker_id();
        let mut workers = self.workers.lock().await;
        if let Some(previous) = workers.remove(&id) {
            debug!("Replacing worker for checker {}", id);
            previous.stop().await;
        }

        let token = self.root.child_token();
        let handle = {
            let worker = worker.clone();
            tokio::spawn(async move { worker.run(token).await })
        };
        workers.insert(id, Entry { worker, handle });
        self.metrics.update_active_workers(workers.len());
    }

    /// 关闭并移除worker，返回是否存在
    pub async fn remove(&self, id: i64) -> bool {
        let mut workers = self.workers.lock().await;
        let Some(entry) = workers.remove(&id) else {
            return false;
        };
        entry.stop().await;
        self.metrics.update_active_workers(workers.len());
        true
    }

    pub async fn close_all(&self) {
        let mut workers = self.workers.lock().await;
        let count = workers.len();
        for (_, entry) in workers.drain() {
            entry.stop().await;
        }
        self.metrics.update_active_workers(0);
        debug!("Closed {} workers", count);
    }

    /// 是否已有循环在以完全相同的定义运行
    pub async fn is_running(&self, checker: &Checker) -> bool {
        self.workers
            .lock()
            .await
            .get(&checker.id)
            .is_some_and(|entry| {
                !entry.handle.is_finished() && entry.worker.checker() == Some(checker)
            })
    }

    pub async fn contains(&self, id: i64) -> bool {
        self.workers.lock().await.contains_key(&id)
    }

    pub async fn len(&self) -> usize {
        self.workers.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.workers.lock().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;

    /// 记录同一ID同时运行的循环数
    struct TrackingWorker {
        id: i64,
        running: Arc<AtomicUsize>,
        max_running: Arc<AtomicUsize>,
        closed: CancellationToken,
        closes: AtomicUsize,
    }

    impl TrackingWorker {
        fn new(id: i64, running: Arc<AtomicUsize>, max_running: Arc<AtomicUsize>) -> Arc<Self> {
            Arc::new(Self {
                id,
                running,
                max_running,
                closed: CancellationToken::new(),
                closes: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Worker for TrackingWorker {
        fn checker_id(&self) -> i64 {
            self.id
        }

        async fn run(&self, cancel: CancellationToken) {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_running.fetch_max(now, Ordering::SeqCst);
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = self.closed.cancelled() => {}
            }
            // 模拟退出前的收尾
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.running.fetch_sub(1, Ordering::SeqCst);
        }

        async fn close(&self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
            self.closed.cancel();
        }
    }

    fn manager(root: CancellationToken) -> WorkerManager {
        WorkerManager::new(root, Arc::new(MetricsCollector::new()))
    }

    #[tokio::test]
    async fn test_put_replaces_without_overlap() {
        let manager = manager(CancellationToken::new());
        let running = Arc::new(AtomicUsize::new(0));
        let max_running = Arc::new(AtomicUsize::new(0));

        let mut previous = Vec::new();
        for _ in 0..5 {
            let worker = TrackingWorker::new(7, running.clone(), max_running.clone());
            manager.put(worker.clone()).await;
            tokio::task::yield_now().await;
            previous.push(worker);
        }

        assert_eq!(manager.len().await, 1);
        assert_eq!(max_running.load(Ordering::SeqCst), 1);
        for worker in &previous[..4] {
            assert_eq!(worker.closes.load(Ordering::SeqCst), 1);
        }
        assert_eq!(previous[4].closes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_remove_closes_and_joins() {
        let manager = manager(CancellationToken::new());
        let running = Arc::new(AtomicUsize::new(0));
        let worker = TrackingWorker::new(1, running.clone(), Arc::new(AtomicUsize::new(0)));
        manager.put(worker.clone()).await;
        tokio::task::yield_now().await;

        assert!(manager.remove(1).await);
        assert_eq!(running.load(Ordering::SeqCst), 0);
        assert_eq!(worker.closes.load(Ordering::SeqCst), 1);
        assert!(!manager.contains(1).await);
        assert!(!manager.remove(1).await);
    }

    #[tokio::test]
    async fn test_root_cancellation_stops_all() {
        let root = CancellationToken::new();
        let manager = manager(root.clone());
        let running = Arc::new(AtomicUsize::new(0));
        for id in 1..=3 {
            manager
                .put(TrackingWorker::new(id, running.clone(), Arc::new(AtomicUsize::new(0))))
                .await;
        }
        tokio::task::yield_now().await;

        root.cancel();
        manager.close_all().await;
        assert_eq!(running.load(Ordering::SeqCst), 0);
        assert!(manager.is_empty().await);
    }
}
