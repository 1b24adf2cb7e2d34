use std::sync::Arc;

use anyhow::{Context, Result};
use checker_core::config::{CheckerSourceKind, ElectionBackend};
use checker_core::AppConfig;
use checker_dispatcher::{AssignedCheckerLister, Dispatcher, LeaderRole, Scheduler};
use checker_domain::{CheckerSource, Election, MetricSink, ScheduleStorage};
use checker_infrastructure::{
    init_metrics, InMemoryScheduleStorage, JsonLinesSink, LocalElection, MetricsCollector,
    RedisCheckerSource, RedisConnectionManager, RedisElection, RedisScheduleStorage,
    StaticCheckerSource,
};
use checker_worker::{HandlerRegistry, WorkerManager, WorkerProvider};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// 主应用程序
///
/// 每个节点都运行 Dispatcher 与 WorkerProvider；Scheduler 只在本节点当选 Leader 时运行。
pub struct Application {
    config: AppConfig,
    node_id: String,
    registry: Arc<HandlerRegistry>,
    sink: Arc<dyn MetricSink>,
    metrics: Arc<MetricsCollector>,
}

impl Application {
    pub fn new(config: AppConfig) -> Self {
        let node_id = config.node.resolve_id();
        Self {
            config,
            node_id,
            registry: Arc::new(HandlerRegistry::new()),
            sink: Arc::new(JsonLinesSink::stdout()),
            metrics: Arc::new(MetricsCollector::new()),
        }
    }

    /// 嵌入方在启动前注册自己的拨测插件
    pub fn with_registry(mut self, registry: Arc<HandlerRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn MetricSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    /// 组装并运行所有组件，直到令牌被取消且所有组件退出
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        info!("初始化应用程序，节点: {}", self.node_id);

        if let Some(addr) = self.config.observability.metrics_addr()? {
            init_metrics(addr).context("启动指标导出失败")?;
        }

        let redis = self.connect_redis().await?;
        let mut tasks: Vec<(&'static str, JoinHandle<()>)> = Vec::new();

        let election: Arc<dyn Election> = match self.config.election.backend {
            ElectionBackend::Local => Arc::new(LocalElection::single(self.node_id.clone())),
            ElectionBackend::Redis => {
                let connection = redis.clone().context("Redis连接未初始化")?;
                let election = Arc::new(RedisElection::new(
                    connection,
                    self.node_id.clone(),
                    &self.config.election,
                ));
                let runner = election.clone();
                let token = cancel.clone();
                tasks.push(("election", tokio::spawn(async move { runner.run(token).await })));
                election
            }
        };

        let storage: Arc<dyn ScheduleStorage> = match self.config.election.backend {
            ElectionBackend::Local => Arc::new(InMemoryScheduleStorage::new(election.clone())),
            ElectionBackend::Redis => Arc::new(RedisScheduleStorage::new(
                redis.clone().context("Redis连接未初始化")?,
                election.clone(),
                self.config.election.key_prefix.clone(),
                self.metrics.clone(),
            )),
        };

        let source = self.create_source(redis)?;

        let scheduler = Arc::new(Scheduler::new(
            storage.clone(),
            source.clone(),
            self.config.scheduler.clone(),
            self.metrics.clone(),
        ));
        let leader = Arc::new(LeaderRole::new(election, scheduler));

        let lister = Arc::new(AssignedCheckerLister::new(
            self.node_id.clone(),
            storage,
            source.clone(),
        ));
        let dispatcher = Arc::new(
            Dispatcher::new(lister, &self.config.dispatcher, self.metrics.clone())
                .with_changes(source.changes()),
        );
        let events = dispatcher.watch();

        let manager = Arc::new(WorkerManager::new(cancel.child_token(), self.metrics.clone()));
        let provider = Arc::new(WorkerProvider::new(
            self.registry.clone(),
            manager,
            self.sink.clone(),
            self.config.worker.default_periodic_worker_interval,
            self.metrics.clone(),
        ));

        {
            let token = cancel.clone();
            tasks.push(("leader", tokio::spawn(async move { leader.run(token).await })));
        }
        {
            let token = cancel.clone();
            tasks.push(("dispatcher", tokio::spawn(async move { dispatcher.run(token).await })));
        }
        {
            let token = cancel.clone();
            tasks.push((
                "worker_provider",
                tokio::spawn(async move { provider.run(events, token).await }),
            ));
        }

        info!("应用程序已启动，组件数: {}", tasks.len());

        for (name, handle) in tasks {
            if let Err(e) = handle.await {
                error!("组件 {} 异常退出: {}", name, e);
            }
        }

        info!("所有组件已停止");
        Ok(())
    }

    async fn connect_redis(&self) -> Result<Option<RedisConnectionManager>> {
        let needs_redis = self.config.election.backend == ElectionBackend::Redis
            || self.config.dispatcher.source == CheckerSourceKind::Redis;
        if !needs_redis {
            return Ok(None);
        }
        let connection = RedisConnectionManager::new(&self.config.redis.url)
            .await
            .with_context(|| format!("连接Redis失败: {}", self.config.redis.url))?;
        Ok(Some(connection))
    }

    fn create_source(
        &self,
        redis: Option<RedisConnectionManager>,
    ) -> Result<Arc<dyn CheckerSource>> {
        let dispatcher = &self.config.dispatcher;
        let source: Arc<dyn CheckerSource> = match dispatcher.source {
            CheckerSourceKind::Static => match dispatcher.static_path.as_deref() {
                Some(path) => Arc::new(
                    StaticCheckerSource::from_file(path)
                        .with_context(|| format!("加载拨测定义文件失败: {path}"))?,
                ),
                None => Arc::new(StaticCheckerSource::empty()),
            },
            CheckerSourceKind::Redis => Arc::new(RedisCheckerSource::new(
                redis.context("Redis连接未初始化")?,
                dispatcher.cache_key.clone(),
            )),
        };
        Ok(source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;

    #[test]
    fn test_node_id_comes_from_config() {
        let config = AppConfig::from_toml("[node]\nid = \"node-7\"").unwrap();
        let app = Application::new(config);
        assert_eq!(app.node_id(), "node-7");
    }

    #[tokio::test]
    async fn test_run_local_cluster_until_cancelled() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[[checkers]]\nid = 1\nname = \"home\"\ntype = \"http\"").unwrap();

        let mut config = AppConfig::default();
        config.node.id = Some("node-a".to_string());
        config.dispatcher.static_path = Some(file.path().to_string_lossy().into_owned());

        let app = Arc::new(Application::new(config));
        let cancel = CancellationToken::new();
        let handle = {
            let app = app.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { app.run(cancel).await })
        };

        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();

        let result = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_missing_static_file_fails_fast() {
        let mut config = AppConfig::default();
        config.dispatcher.static_path = Some("/no/such/checkers.toml".to_string());

        let app = Application::new(config);
        assert!(app.run(CancellationToken::new()).await.is_err());
    }
}
