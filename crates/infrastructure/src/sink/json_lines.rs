use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt, Stdout};
use tokio::sync::Mutex;

use checker_core::{CheckerError, CheckerResult};
use checker_domain::{Metric, MetricSink};

/// 每个指标一行JSON写入任意异步输出
pub struct JsonLinesSink<W> {
    writer: Mutex<W>,
}

impl JsonLinesSink<Stdout> {
    pub fn stdout() -> Self {
        Self::new(tokio::io::stdout())
    }
}

impl<W> JsonLinesSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

#[async_trait]
impl<W> MetricSink for JsonLinesSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn send(&self, metrics: Vec<Metric>) -> CheckerResult<()> {
        if metrics.is_empty() {
            return Ok(());
        }

        let mut buf = Vec::new();
        for metric in &metrics {
            serde_json::to_writer(&mut buf, metric)?;
            buf.push(b'\n');
        }

        // 整批一次写入，避免并发上报时行交错
        let mut writer = self.writer.lock().await;
        writer
            .write_all(&buf)
            .await
            .map_err(|e| CheckerError::Sink(e.to_string()))?;
        writer
            .flush()
            .await
            .map_err(|e| CheckerError::Sink(e.to_string()))
    }
}
