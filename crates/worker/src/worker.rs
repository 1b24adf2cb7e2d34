use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use checker_domain::Checker;
use checker_infrastructure::{MetricsCollector, StructuredLogger};

use crate::context::{Reporter, TaskContext};
use crate::handler::Probe;

/// 单个拨测的执行循环
#[async_trait]
pub trait Worker: Send + Sync {
    fn checker_id(&self) -> i64;

    /// 循环所执行的拨测定义
    fn checker(&self) -> Option<&Checker> {
        None
    }

    /// 阻塞直到 `cancel` 被取消或 `close` 被调用
    async fn run(&self, cancel: CancellationToken);

    /// 停止循环并释放拨测持有的资源，可重复调用
    async fn close(&self);
}

/// 按固定周期执行拨测
///
/// 首次执行立即开始；同一拨测的两次执行不会重叠，
/// 执行耗时超过周期时下一次顺延。执行失败只记录日志，不会终止循环。
pub struct PeriodicWorker {
    checker: Checker,
    interval: Duration,
    probe: Probe,
    reporter: Arc<dyn Reporter>,
    closed: CancellationToken,
    released: AtomicBool,
    metrics: Arc<MetricsCollector>,
}

impl PeriodicWorker {
    pub fn new(
        checker: Checker,
        interval: Duration,
        probe: Probe,
        reporter: Arc<dyn Reporter>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            checker,
            interval,
            probe,
            reporter,
            closed: CancellationToken::new(),
            released: AtomicBool::new(false),
            metrics,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    async fn stopped(&self, cancel: &CancellationToken) {
        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = self.closed.cancelled() => {}
        }
    }

    async fn execute_once(&self) {
        let ctx = TaskContext::new(
            self.checker.id,
            self.closed.child_token(),
            self.reporter.clone(),
        );
        let start = Instant::now();
        let result = self.probe.execute(&ctx).await;
        let elapsed = start.elapsed();

        self.metrics
            .record_probe(&self.checker.checker_type, result.is_ok(), elapsed);
        let error = result.err().map(|e| e.to_string());
        StructuredLogger::log_probe_complete(
            self.checker.id,
            &self.checker.checker_type,
            elapsed,
            error.as_deref(),
        );
    }
}

#[async_trait]
impl Worker for PeriodicWorker {
    fn checker_id(&self) -> i64 {
        self.checker.id
    }

    fn checker(&self) -> Option<&Checker> {
        Some(&self.checker)
    }

    async fn run(&self, cancel: CancellationToken) {
        StructuredLogger::log_worker_started(
            self.checker.id,
            &self.checker.checker_type,
            self.interval,
        );
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = self.stopped(&cancel) => break,
                _ = ticker.tick() => {}
            }

            // 停止时丢弃正在执行的拨测
            tokio::select! {
                biased;
                _ = self.stopped(&cancel) => break,
                _ = self.execute_once() => {}
            }
        }

        // 外部取消同样传递给已派生的任务上下文
        self.closed.cancel();
        StructuredLogger::log_worker_stopped(self.checker.id);
    }

    async fn close(&self) {
        self.closed.cancel();
        if !self.released.swap(true, Ordering::SeqCst) {
            self.probe.close().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SinkReporter;
    use crate::handler::Plugin;
    use crate::test_utils::{CountingPlugin, RecordingSink};

    fn worker(plugin: &CountingPlugin, checker: Checker, every: Duration) -> Arc<PeriodicWorker> {
        let probe = plugin.create(&checker).unwrap();
        let sink = Arc::new(RecordingSink::default());
        Arc::new(PeriodicWorker::new(
            checker.clone(),
            every,
            probe,
            Arc::new(SinkReporter::new(checker.id, sink)),
            Arc::new(MetricsCollector::new()),
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn test_runs_immediately_then_every_interval() {
        let plugin = CountingPlugin::default();
        let worker = worker(&plugin, Checker::new(1, "a", "counter"), Duration::from_secs(10));
        let cancel = CancellationToken::new();
        let handle = {
            let worker = worker.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { worker.run(cancel).await })
        };

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(plugin.state.executions(), 1);

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(plugin.state.executions(), 3);

        cancel.cancel();
        handle.await.unwrap();
        // 外部取消不调用closer，由WorkerManager负责关闭
        assert_eq!(plugin.state.closes(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_probe_never_overlaps() {
        let plugin = CountingPlugin::default();
        let checker = Checker::new(1, "a", "counter").with_config("delay", "25s");
        let worker = worker(&plugin, checker, Duration::from_secs(10));
        let cancel = CancellationToken::new();
        let handle = {
            let worker = worker.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { worker.run(cancel).await })
        };

        tokio::time::sleep(Duration::from_secs(100)).await;
        cancel.cancel();
        handle.await.unwrap();

        // 25s的执行使10s的周期顺延：0、25、50、75、100
        assert_eq!(plugin.state.max_active(), 1);
        assert!((4..=5).contains(&plugin.state.executions()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_do_not_stop_loop() {
        let plugin = CountingPlugin::default();
        let checker = Checker::new(1, "a", "counter").with_config("fail", "true");
        let worker = worker(&plugin, checker, Duration::from_secs(5));
        let cancel = CancellationToken::new();
        let handle = {
            let worker = worker.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { worker.run(cancel).await })
        };

        tokio::time::sleep(Duration::from_secs(12)).await;
        assert_eq!(plugin.state.executions(), 3);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_stops_loop_and_releases_once() {
        let plugin = CountingPlugin::default();
        let checker = Checker::new(1, "a", "counter").with_config("delay", "1h");
        let worker = worker(&plugin, checker, Duration::from_secs(5));
        let handle = {
            let worker = worker.clone();
            tokio::spawn(async move { worker.run(CancellationToken::new()).await })
        };

        tokio::time::sleep(Duration::from_secs(1)).await;
        worker.close().await;
        worker.close().await;
        handle.await.unwrap();

        assert_eq!(plugin.state.executions(), 1);
        assert_eq!(plugin.state.closes(), 1);
    }
}
