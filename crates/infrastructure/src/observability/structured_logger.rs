//! Structured logging utilities
//!
//! 关键生命周期事件统一使用 `event = "..."` 字段，便于JSON日志检索。

use std::time::Duration;

use tracing::{debug, error, info, warn};

use checker_domain::{Event, NodeEvent};

/// Structured logging utilities
pub struct StructuredLogger;

impl StructuredLogger {
    /// Log a finished schedule pass
    pub fn log_schedule_pass(
        total_ids: usize,
        nodes: usize,
        assigned: usize,
        released: usize,
        duration: Duration,
    ) {
        info!(
            event = "schedule_pass",
            schedule.total_ids = total_ids,
            schedule.nodes = nodes,
            schedule.assigned = assigned,
            schedule.released = released,
            schedule.duration_ms = duration.as_millis() as u64,
            "Schedule pass completed"
        );
    }

    /// Log leadership transition of the local node
    pub fn log_leadership_change(node_id: &str, is_leader: bool) {
        if is_leader {
            info!(
                event = "leadership_acquired",
                node.id = node_id,
                "Node became leader"
            );
        } else {
            warn!(
                event = "leadership_lost",
                node.id = node_id,
                "Node is no longer leader"
            );
        }
    }

    /// Log cluster membership change
    pub fn log_node_event(event: &NodeEvent) {
        info!(
            event = "membership_change",
            node.id = %event.node,
            node.action = ?event.action,
            "Cluster membership changed"
        );
    }

    /// Log a checker event emitted by the dispatcher
    pub fn log_checker_event(event: &Event) {
        debug!(
            event = "checker_event",
            checker.id = event.data.id,
            checker.name = %event.data.name,
            checker.type = %event.data.checker_type,
            checker.action = event.action.as_str(),
            "Checker event dispatched"
        );
    }

    /// Log an event that could not be delivered in time
    pub fn log_event_dropped(event: &Event, timeout: Duration) {
        warn!(
            event = "checker_event_dropped",
            checker.id = event.data.id,
            checker.action = event.action.as_str(),
            timeout_ms = timeout.as_millis() as u64,
            "Checker event dropped, will be re-derived on next load"
        );
    }

    /// Log worker start
    pub fn log_worker_started(checker_id: i64, checker_type: &str, interval: Duration) {
        info!(
            event = "worker_started",
            checker.id = checker_id,
            checker.type = checker_type,
            worker.interval_ms = interval.as_millis() as u64,
            "Worker started"
        );
    }

    /// Log worker stop
    pub fn log_worker_stopped(checker_id: i64) {
        info!(
            event = "worker_stopped",
            checker.id = checker_id,
            "Worker stopped"
        );
    }

    /// Log probe completion
    pub fn log_probe_complete(
        checker_id: i64,
        checker_type: &str,
        duration: Duration,
        error_message: Option<&str>,
    ) {
        match error_message {
            None => debug!(
                event = "probe_complete",
                checker.id = checker_id,
                checker.type = checker_type,
                probe.duration_ms = duration.as_millis() as u64,
                "Probe completed"
            ),
            Some(message) => warn!(
                event = "probe_failed",
                checker.id = checker_id,
                checker.type = checker_type,
                probe.duration_ms = duration.as_millis() as u64,
                probe.error = message,
                "Probe failed"
            ),
        }
    }

    /// Log system error
    pub fn log_system_error(component: &str, operation: &str, error: &dyn std::error::Error) {
        error!(
            event = "system_error",
            error.component = component,
            error.operation = operation,
            error.message = %error,
            "System error occurred"
        );
    }
}
