use async_trait::async_trait;

use crate::entities::Metric;
use checker_core::CheckerResult;

/// 拨测结果接收端
#[async_trait]
pub trait MetricSink: Send + Sync {
    async fn send(&self, metrics: Vec<Metric>) -> CheckerResult<()>;
}
