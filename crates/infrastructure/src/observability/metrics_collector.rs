//! 调度引擎内部指标
//!
//! 与拨测结果（`Metric`，经 `MetricSink` 上报）无关，这里记录的是
//! 引擎自身的运行状况，通过Prometheus暴露。

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, gauge, histogram, Counter, Gauge, Histogram};
use tracing::{debug, info};

use checker_core::{CheckerError, CheckerResult};

/// Metrics collector for the checker scheduling engine
pub struct MetricsCollector {
    // Scheduler metrics
    schedule_passes_total: Counter,
    schedule_failures_total: Counter,
    schedule_duration: Histogram,
    scheduled_checkers: Gauge,

    // Dispatcher metrics
    load_failures_total: Counter,
    events_dropped_total: Counter,
    loaded_checkers: Gauge,

    // Worker metrics
    active_workers: Gauge,
    probe_duration: Histogram,

    // Storage metrics
    storage_operation_duration: Histogram,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            schedule_passes_total: counter!("checker_schedule_passes_total"),
            schedule_failures_total: counter!("checker_schedule_failures_total"),
            schedule_duration: histogram!("checker_schedule_duration_seconds"),
            scheduled_checkers: gauge!("checker_scheduled_checkers"),
            load_failures_total: counter!("checker_dispatcher_load_failures_total"),
            events_dropped_total: counter!("checker_dispatcher_events_dropped_total"),
            loaded_checkers: gauge!("checker_dispatcher_loaded_checkers"),
            active_workers: gauge!("checker_active_workers"),
            probe_duration: histogram!("checker_probe_duration_seconds"),
            storage_operation_duration: histogram!("checker_storage_operation_duration_seconds"),
        }
    }

    // Scheduler metrics

    /// Record a completed schedule pass
    pub fn record_schedule_pass(&self, total_ids: usize, duration: Duration) {
        self.schedule_passes_total.increment(1);
        self.schedule_duration.record(duration.as_secs_f64());
        self.scheduled_checkers.set(total_ids as f64);
    }

    pub fn record_schedule_failure(&self) {
        self.schedule_failures_total.increment(1);
    }

    /// 每个节点当前分配到的拨测数量
    pub fn update_node_assignment(&self, node_id: &str, count: usize) {
        gauge!("checker_node_assigned_checkers", "node" => node_id.to_string()).set(count as f64);
    }

    // Dispatcher metrics

    pub fn record_load(&self, checkers: usize) {
        self.loaded_checkers.set(checkers as f64);
    }

    pub fn record_load_failure(&self) {
        self.load_failures_total.increment(1);
    }

    pub fn record_event(&self, action: &'static str) {
        counter!("checker_dispatcher_events_total", "action" => action).increment(1);
    }

    pub fn record_event_dropped(&self) {
        self.events_dropped_total.increment(1);
    }

    // Worker metrics

    pub fn update_active_workers(&self, count: usize) {
        self.active_workers.set(count as f64);
    }

    /// Record one probe run
    pub fn record_probe(&self, checker_type: &str, success: bool, duration: Duration) {
        let status = if success { "success" } else { "failure" };
        counter!(
            "checker_probe_executions_total",
            "type" => checker_type.to_string(),
            "status" => status
        )
        .increment(1);
        self.probe_duration.record(duration.as_secs_f64());
    }

    // Storage metrics

    pub fn record_storage_operation(&self, operation: &str, duration: Duration) {
        self.storage_operation_duration.record(duration.as_secs_f64());
        debug!(
            operation = operation,
            duration_ms = duration.as_millis() as u64,
            "Storage operation completed"
        );
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// 安装Prometheus导出器，需要在tokio运行时内调用
pub fn init_metrics(listen: SocketAddr) -> CheckerResult<()> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(listen)
        .install()
        .map_err(|e| CheckerError::Internal(format!("Failed to install metrics exporter: {e}")))?;

    info!("Prometheus metrics exporter listening on {}", listen);
    Ok(())
}
