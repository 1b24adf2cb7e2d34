use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use checker_core::CheckerResult;
use checker_domain::{Metric, MetricSink};

/// 拨测结果上报能力
#[async_trait]
pub trait Reporter: Send + Sync {
    async fn report(&self, metrics: Vec<Metric>) -> CheckerResult<()>;
}

/// 把结果转发给 `MetricSink`，缺少 `checker_id` 标签的指标自动补上
pub struct SinkReporter {
    checker_id: i64,
    sink: Arc<dyn MetricSink>,
}

impl SinkReporter {
    pub fn new(checker_id: i64, sink: Arc<dyn MetricSink>) -> Self {
        Self { checker_id, sink }
    }
}

#[async_trait]
impl Reporter for SinkReporter {
    async fn report(&self, mut metrics: Vec<Metric>) -> CheckerResult<()> {
        let id = self.checker_id.to_string();
        for metric in &mut metrics {
            metric
                .tags
                .entry("checker_id".to_string())
                .or_insert_with(|| id.clone());
        }
        self.sink.send(metrics).await
    }
}

/// 单次拨测执行的上下文：取消信号 + 结果上报
#[derive(Clone)]
pub struct TaskContext {
    checker_id: i64,
    cancel: CancellationToken,
    reporter: Arc<dyn Reporter>,
}

impl TaskContext {
    pub fn new(checker_id: i64, cancel: CancellationToken, reporter: Arc<dyn Reporter>) -> Self {
        Self {
            checker_id,
            cancel,
            reporter,
        }
    }

    pub fn checker_id(&self) -> i64 {
        self.checker_id
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// 等待取消，handler内部的长耗时操作可以与之 `select!`
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    pub async fn report(&self, metrics: Vec<Metric>) -> CheckerResult<()> {
        self.reporter.report(metrics).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use checker_infrastructure::JsonLinesSink;

    #[tokio::test]
    async fn test_sink_reporter_tags_checker_id() {
        let sink = Arc::new(JsonLinesSink::new(Vec::new()));
        let reporter = SinkReporter::new(12, sink.clone());
        let ctx = TaskContext::new(12, CancellationToken::new(), Arc::new(reporter));

        ctx.report(vec![
            Metric::new("latency").field("ms", 15),
            Metric::new("latency").tag("checker_id", "override"),
        ])
        .await
        .unwrap();

        drop(ctx);
        let sink = Arc::try_unwrap(sink).ok().unwrap();
        let output = String::from_utf8(sink.into_inner()).unwrap();
        let tags: Vec<String> = output
            .lines()
            .map(|line| serde_json::from_str::<Metric>(line).unwrap().tags["checker_id"].clone())
            .collect();
        assert_eq!(tags, vec!["12".to_string(), "override".to_string()]);
    }

    #[test]
    fn test_context_cancellation() {
        let token = CancellationToken::new();
        let sink = Arc::new(JsonLinesSink::new(Vec::new()));
        let ctx = TaskContext::new(1, token.child_token(), Arc::new(SinkReporter::new(1, sink)));
        assert!(!ctx.is_cancelled());
        token.cancel();
        assert!(ctx.is_cancelled());
        assert_eq!(ctx.checker_id(), 1);
    }
}
