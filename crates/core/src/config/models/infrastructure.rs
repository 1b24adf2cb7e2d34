use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::duration::serde_str;

/// 当前进程在集群中的身份
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// 为空时使用 `<hostname>-<pid>`
    pub id: Option<String>,
}

impl NodeConfig {
    pub fn resolve_id(&self) -> String {
        match self.id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => {
                let host = hostname::get()
                    .ok()
                    .and_then(|h| h.into_string().ok())
                    .unwrap_or_else(|| "localhost".to_string());
                format!("{}-{}", host, std::process::id())
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    pub url: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379/0".to_string(),
        }
    }
}

impl RedisConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.url.starts_with("redis://") && !self.url.starts_with("rediss://") {
            return Err(anyhow::anyhow!("Redis URL格式无效: {}", self.url));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElectionBackend {
    /// 单进程集群，本节点始终为Leader
    Local,
    /// 基于Redis租约的选主与成员发现
    Redis,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ElectionConfig {
    pub backend: ElectionBackend,
    pub key_prefix: String,
    #[serde(with = "serde_str")]
    pub lease_ttl: Duration,
    #[serde(with = "serde_str")]
    pub heartbeat_interval: Duration,
}

impl Default for ElectionConfig {
    fn default() -> Self {
        Self {
            backend: ElectionBackend::Local,
            key_prefix: "checker".to_string(),
            lease_ttl: Duration::from_secs(15),
            heartbeat_interval: Duration::from_secs(5),
        }
    }
}

impl ElectionConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.key_prefix.trim().is_empty() {
            return Err(anyhow::anyhow!("key_prefix不能为空"));
        }
        if self.lease_ttl.is_zero() || self.heartbeat_interval.is_zero() {
            return Err(anyhow::anyhow!("租约时间和心跳间隔必须大于0"));
        }
        if self.heartbeat_interval >= self.lease_ttl {
            return Err(anyhow::anyhow!(
                "心跳间隔({:?})必须小于租约时间({:?})",
                self.heartbeat_interval,
                self.lease_ttl
            ));
        }
        Ok(())
    }
}
