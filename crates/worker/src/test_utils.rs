//! 单元测试共用的测试替身

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use checker_core::config::parse_duration;
use checker_core::{CheckerError, CheckerResult};
use checker_domain::{Checker, Metric, MetricSink};

use crate::context::{SinkReporter, TaskContext};
use crate::handler::{Closeable, Handler, Plugin, Probe};

/// 记录收到的全部指标
#[derive(Default)]
pub struct RecordingSink {
    metrics: Mutex<Vec<Metric>>,
}

impl RecordingSink {
    pub fn metrics(&self) -> Vec<Metric> {
        self.metrics.lock().unwrap().clone()
    }
}

#[async_trait]
impl MetricSink for RecordingSink {
    async fn send(&self, metrics: Vec<Metric>) -> CheckerResult<()> {
        self.metrics.lock().unwrap().extend(metrics);
        Ok(())
    }
}

pub fn test_context(checker_id: i64) -> TaskContext {
    TaskContext::new(
        checker_id,
        CancellationToken::new(),
        Arc::new(SinkReporter::new(checker_id, Arc::new(RecordingSink::default()))),
    )
}

/// 所有由同一插件创建的拨测共享的计数
#[derive(Default)]
pub struct ProbeState {
    executions: AtomicUsize,
    closes: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl ProbeState {
    pub fn executions(&self) -> usize {
        self.executions.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

/// 按配置控制行为的拨测：
/// `fail_validation` / `fail_create` / `fail` 为 `true` 时对应阶段失败，
/// `delay` 为单次执行耗时。
#[derive(Default)]
pub struct CountingPlugin {
    pub state: Arc<ProbeState>,
}

impl Plugin for CountingPlugin {
    fn validate(&self, checker: &Checker) -> CheckerResult<()> {
        if checker.config_value("fail_validation") == Some("true") {
            return Err(CheckerError::invalid_checker(checker.id, "validation failed"));
        }
        Ok(())
    }

    fn create(&self, checker: &Checker) -> CheckerResult<Probe> {
        if checker.config_value("fail_create") == Some("true") {
            return Err(CheckerError::invalid_checker(checker.id, "create failed"));
        }
        let delay = match checker.config_value("delay") {
            Some(value) => parse_duration(value)?,
            None => Duration::ZERO,
        };
        Ok(Probe::closeable(CountingHandler {
            state: self.state.clone(),
            fail: checker.config_value("fail") == Some("true"),
            delay,
        }))
    }
}

/// 执行被中途丢弃时同样递减计数
struct ActiveGuard<'a> {
    state: &'a ProbeState,
}

impl<'a> ActiveGuard<'a> {
    fn enter(state: &'a ProbeState) -> Self {
        let active = state.active.fetch_add(1, Ordering::SeqCst) + 1;
        state.max_active.fetch_max(active, Ordering::SeqCst);
        Self { state }
    }
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.state.active.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct CountingHandler {
    state: Arc<ProbeState>,
    fail: bool,
    delay: Duration,
}

#[async_trait]
impl Handler for CountingHandler {
    async fn execute(&self, ctx: &TaskContext) -> CheckerResult<()> {
        let _active = ActiveGuard::enter(&self.state);
        self.state.executions.fetch_add(1, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        ctx.report(vec![Metric::new("counter").field("ok", !self.fail)])
            .await?;
        if self.fail {
            return Err(CheckerError::Execution("probe failed".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Closeable for CountingHandler {
    async fn close(&self) {
        self.state.closes.fetch_add(1, Ordering::SeqCst);
    }
}
