use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::duration::serde_str;

/// Scheduler配置（仅Leader节点生效）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// 两次调度之间的最长间隔，存储键的保活时间为其两倍
    #[serde(with = "serde_str")]
    pub max_schedule_interval: Duration,
    /// 是否在节点加入后把超额的拨测迁移到负载较低的节点
    pub rebalance: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_schedule_interval: Duration::from_secs(180),
            rebalance: true,
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_schedule_interval.is_zero() {
            return Err(anyhow::anyhow!("调度间隔必须大于0"));
        }
        Ok(())
    }

    /// 节点分配集合的TTL
    pub fn keep_alive_ttl(&self) -> Duration {
        self.max_schedule_interval * 2
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckerSourceKind {
    /// 本地文件定义，支持运行时put/remove
    Static,
    /// Redis哈希缓存（`cache_key`）
    Redis,
}

/// Dispatcher配置（每个节点都运行）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    #[serde(with = "serde_str")]
    pub load_checkers_interval: Duration,
    pub cache_key: String,
    pub source: CheckerSourceKind,
    pub static_path: Option<String>,
    /// 每个watcher的事件通道容量
    pub event_buffer: usize,
    /// 单个事件投递的最长等待时间，超时后丢弃并在下一轮重新派生
    #[serde(with = "serde_str")]
    pub send_timeout: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            load_checkers_interval: Duration::from_secs(60),
            cache_key: "checkers".to_string(),
            source: CheckerSourceKind::Static,
            static_path: None,
            event_buffer: 256,
            send_timeout: Duration::from_secs(5),
        }
    }
}

impl DispatcherConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.load_checkers_interval.is_zero() {
            return Err(anyhow::anyhow!("加载间隔必须大于0"));
        }
        if self.cache_key.trim().is_empty() {
            return Err(anyhow::anyhow!("cache_key不能为空"));
        }
        if self.event_buffer == 0 {
            return Err(anyhow::anyhow!("事件缓冲区容量必须大于0"));
        }
        if self.send_timeout.is_zero() {
            return Err(anyhow::anyhow!("事件投递超时必须大于0"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// 拨测未声明 `interval` 时使用的周期
    #[serde(with = "serde_str")]
    pub default_periodic_worker_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            default_periodic_worker_interval: Duration::from_secs(30),
        }
    }
}

impl WorkerConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.default_periodic_worker_interval.is_zero() {
            return Err(anyhow::anyhow!("默认拨测周期必须大于0"));
        }
        Ok(())
    }
}
