use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use checker_core::CheckerResult;
use checker_domain::{Checker, Event, EventAction, MetricSink};
use checker_infrastructure::MetricsCollector;

use crate::context::SinkReporter;
use crate::handler::PluginRegistry;
use crate::manager::WorkerManager;
use crate::strategy::Strategy;
use crate::worker::{PeriodicWorker, Worker};

/// 消费Dispatcher事件，驱动Worker的创建、替换和销毁
///
/// 单个拨测的校验或创建失败只记录日志并跳过，已在运行的旧worker保持不变。
pub struct WorkerProvider {
    registry: Arc<dyn PluginRegistry>,
    manager: Arc<WorkerManager>,
    sink: Arc<dyn MetricSink>,
    default_interval: Duration,
    metrics: Arc<MetricsCollector>,
}

impl WorkerProvider {
    pub fn new(
        registry: Arc<dyn PluginRegistry>,
        manager: Arc<WorkerManager>,
        sink: Arc<dyn MetricSink>,
        default_interval: Duration,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            registry,
            manager,
            sink,
            default_interval,
            metrics,
        }
    }

    pub fn manager(&self) -> &Arc<WorkerManager> {
        &self.manager
    }

    /// 处理事件直到取消或事件通道关闭，退出前关闭所有worker
    pub async fn run(&self, mut events: mpsc::Receiver<Event>, cancel: CancellationToken) {
        info!("Worker provider started");
        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => break,
                event = events.recv() => event,
            };
            match event {
                Some(event) => self.handle(event).await,
                None => {
                    debug!("Event channel closed");
                    break;
                }
            }
        }

        self.manager.close_all().await;
        info!("Worker provider stopped");
    }

    pub async fn handle(&self, event: Event) {
        let id = event.checker_id();
        // 投递失败后重新派生的事件可能重复到达，定义未变时保留正在运行的循环
        if event.action != EventAction::Delete && self.manager.is_running(&event.data).await {
            debug!(
                "Checker {} unchanged on {}, keeping running worker",
                id,
                event.action.as_str()
            );
            return;
        }

        match event.action {
            EventAction::Add | EventAction::Update => match self.create_worker(&event.data).await {
                Ok(worker) => self.manager.put(worker).await,
                Err(e) if e.is_checker_scoped() => {
                    warn!(
                        "Skipping checker {} ({}) on {}: {}",
                        id,
                        event.data.checker_type,
                        event.action.as_str(),
                        e
                    );
                }
                Err(e) => {
                    error!(
                        "Failed to create worker for checker {} on {}: {}",
                        id,
                        event.action.as_str(),
                        e
                    );
                }
            },
            EventAction::Delete => {
                if !self.manager.remove(id).await {
                    debug!("No worker running for deleted checker {}", id);
                }
            }
        }
    }

    /// 校验、解析策略、实例化拨测并包装为worker
    pub async fn create_worker(&self, checker: &Checker) -> CheckerResult<Arc<dyn Worker>> {
        self.registry.validate(checker).await?;
        let strategy = Strategy::from_checker(checker, self.default_interval)?;
        let probe = self.registry.create(checker).await?;
        let reporter = Arc::new(SinkReporter::new(checker.id, self.sink.clone()));

        match strategy {
            Strategy::Periodic { interval } => Ok(Arc::new(PeriodicWorker::new(
                checker.clone(),
                interval,
                probe,
                reporter,
                self.metrics.clone(),
            ))),
        }
    }
}
