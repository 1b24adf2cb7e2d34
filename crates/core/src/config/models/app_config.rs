use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::{
    dispatcher_worker::{DispatcherConfig, SchedulerConfig, WorkerConfig},
    infrastructure::{ElectionBackend, ElectionConfig, NodeConfig, RedisConfig},
    observability::ObservabilityConfig,
};
use crate::config::CheckerSourceKind;

/// System configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub node: NodeConfig,
    pub redis: RedisConfig,
    pub election: ElectionConfig,
    pub scheduler: SchedulerConfig,
    pub dispatcher: DispatcherConfig,
    pub worker: WorkerConfig,
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// Load configuration from config file and environment variables
    ///
    /// Load order:
    /// 1. Built-in defaults
    /// 2. Config file (TOML format)
    /// 3. Environment variable overrides (prefix: CHECKER, separator: `__`)
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_path {
            if Path::new(path).exists() {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            } else {
                return Err(anyhow::anyhow!("配置文件不存在: {}", path));
            }
        } else {
            let default_paths = ["config/checker.toml", "checker.toml", "/etc/checker/config.toml"];
            if let Some(path) = default_paths.iter().find(|p| Path::new(p).exists()) {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("CHECKER")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = builder
            .build()
            .context("构建配置失败")?
            .try_deserialize()
            .context("反序列化配置失败")?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(toml_str).context("解析TOML配置失败")?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to TOML string
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("序列化配置为TOML失败")
    }

    pub fn validate(&self) -> Result<()> {
        self.election.validate().context("选主配置验证失败")?;
        if self.election.backend == ElectionBackend::Redis
            || self.dispatcher.source == CheckerSourceKind::Redis
        {
            self.redis.validate().context("Redis配置验证失败")?;
        }
        self.scheduler.validate().context("Scheduler配置验证失败")?;
        self.dispatcher
            .validate()
            .context("Dispatcher配置验证失败")?;
        self.worker.validate().context("Worker配置验证失败")?;
        self.observability
            .validate()
            .context("可观测性配置验证失败")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = AppConfig::default();
        assert_eq!(config.dispatcher.cache_key, "checkers");
        assert_eq!(config.dispatcher.load_checkers_interval, Duration::from_secs(60));
        assert_eq!(config.scheduler.max_schedule_interval, Duration::from_secs(180));
        assert_eq!(config.scheduler.keep_alive_ttl(), Duration::from_secs(360));
        assert_eq!(
            config.worker.default_periodic_worker_interval,
            Duration::from_secs(30)
        );
        assert_eq!(config.election.backend, ElectionBackend::Local);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = AppConfig::from_toml(
            r#"
            [dispatcher]
            load_checkers_interval = "15s"
            cache_key = "probe_defs"

            [scheduler]
            max_schedule_interval = "1m30s"
            "#,
        )
        .unwrap();

        assert_eq!(config.dispatcher.load_checkers_interval, Duration::from_secs(15));
        assert_eq!(config.dispatcher.cache_key, "probe_defs");
        assert_eq!(config.dispatcher.event_buffer, 256);
        assert_eq!(config.scheduler.max_schedule_interval, Duration::from_secs(90));
        assert!(config.scheduler.rebalance);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(AppConfig::from_toml("[dispatcher]\ncache_key = \"\"").is_err());
        assert!(AppConfig::from_toml("[dispatcher]\nevent_buffer = 0").is_err());
        assert!(AppConfig::from_toml("[worker]\ndefault_periodic_worker_interval = \"0s\"").is_err());
        assert!(AppConfig::from_toml("[worker]\ndefault_periodic_worker_interval = \"often\"").is_err());
        assert!(AppConfig::from_toml(
            "[election]\nlease_ttl = \"5s\"\nheartbeat_interval = \"10s\""
        )
        .is_err());
        assert!(AppConfig::from_toml(
            "[election]\nbackend = \"redis\"\n[redis]\nurl = \"http://localhost\""
        )
        .is_err());
    }

    #[test]
    fn test_toml_roundtrip_preserves_durations() {
        let mut config = AppConfig::default();
        config.scheduler.max_schedule_interval = Duration::from_secs(45);
        let text = config.to_toml().unwrap();
        let parsed = AppConfig::from_toml(&text).unwrap();
        assert_eq!(parsed.scheduler.max_schedule_interval, Duration::from_secs(45));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[node]\nid = \"node-a\"\n[dispatcher]\nsource = \"redis\"\n[redis]\nurl = \"redis://cache:6379/1\""
        )
        .unwrap();

        let config = AppConfig::load(file.path().to_str()).unwrap();
        assert_eq!(config.node.resolve_id(), "node-a");
        assert_eq!(config.dispatcher.source, CheckerSourceKind::Redis);
        assert_eq!(config.redis.url, "redis://cache:6379/1");
    }

    #[test]
    fn test_load_missing_file_fails() {
        assert!(AppConfig::load(Some("/definitely/not/here.toml")).is_err());
    }
}
