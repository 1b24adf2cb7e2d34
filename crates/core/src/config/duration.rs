//! 人类可读的时长配置（`30s`、`1m`、`1m30s`）

use std::time::Duration;

use serde::{de, Deserialize, Deserializer, Serializer};

use crate::{CheckerError, CheckerResult};

/// 解析时长字符串，零值视为无效
pub fn parse_duration(value: &str) -> CheckerResult<Duration> {
    let value = value.trim();
    if value.is_empty() {
        return Err(CheckerError::config_error("时长不能为空"));
    }
    let duration = humantime::parse_duration(value)
        .map_err(|e| CheckerError::config_error(format!("无效的时长 '{value}': {e}")))?;
    if duration.is_zero() {
        return Err(CheckerError::config_error(format!("时长必须大于0: '{value}'")));
    }
    Ok(duration)
}

pub fn format_duration(duration: Duration) -> String {
    humantime::format_duration(duration).to_string()
}

/// serde适配：`#[serde(with = "crate::config::duration::serde_str")]`
pub mod serde_str {
    use super::*;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format_duration(*duration))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(raw.trim()).map_err(de::Error::custom)
    }
}
