use std::collections::HashMap;

use async_trait::async_trait;
use tracing::warn;

use checker_core::{CheckerError, CheckerResult};
use checker_domain::{Checker, CheckerSource};

use crate::redis_client::RedisConnectionManager;

/// 以Redis哈希缓存作为拨测定义源
///
/// 哈希键为 `cache_key`，字段为拨测ID，值为JSON编码的定义。
/// 无法解析的条目记录警告后跳过，不影响其他定义。
pub struct RedisCheckerSource {
    connection: RedisConnectionManager,
    cache_key: String,
}

impl RedisCheckerSource {
    pub fn new(connection: RedisConnectionManager, cache_key: impl Into<String>) -> Self {
        Self {
            connection,
            cache_key: cache_key.into(),
        }
    }

    pub fn cache_key(&self) -> &str {
        &self.cache_key
    }

    /// 写入或替换一条定义
    pub async fn put(&self, checker: &Checker) -> CheckerResult<()> {
        let body = serde_json::to_string(checker)?;
        let mut cmd = redis::cmd("HSET");
        cmd.arg(&self.cache_key).arg(checker.id).arg(body);
        let _: i64 = self.connection.execute_command(&mut cmd).await?;
        Ok(())
    }

    pub async fn remove(&self, id: i64) -> CheckerResult<()> {
        let mut cmd = redis::cmd("HDEL");
        cmd.arg(&self.cache_key).arg(id);
        let _: i64 = self.connection.execute_command(&mut cmd).await?;
        Ok(())
    }
}

#[async_trait]
impl CheckerSource for RedisCheckerSource {
    async fn list_ids(&self) -> CheckerResult<Vec<i64>> {
        let mut cmd = redis::cmd("HKEYS");
        cmd.arg(&self.cache_key);
        let keys: Vec<String> = self
            .connection
            .execute_command(&mut cmd)
            .await
            .map_err(|e| CheckerError::Source(e.to_string()))?;

        let mut ids = Vec::with_capacity(keys.len());
        for key in keys {
            match key.parse::<i64>() {
                Ok(id) => ids.push(id),
                Err(_) => warn!("Skipping non-numeric checker key {:?} in {}", key, self.cache_key),
            }
        }
        ids.sort_unstable();
        Ok(ids)
    }

    async fn list_by_ids(&self, ids: &[i64]) -> CheckerResult<HashMap<i64, Checker>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let mut cmd = redis::cmd("HMGET");
        cmd.arg(&self.cache_key);
        for id in ids {
            cmd.arg(*id);
        }
        let bodies: Vec<Option<String>> = self
            .connection
            .execute_command(&mut cmd)
            .await
            .map_err(|e| CheckerError::Source(e.to_string()))?;

        let mut checkers = HashMap::with_capacity(ids.len());
        for (id, body) in ids.iter().zip(bodies) {
            let Some(body) = body else { continue };
            match serde_json::from_str::<Checker>(&body) {
                Ok(checker) if checker.id == *id => {
                    checkers.insert(*id, checker);
                }
                Ok(checker) => warn!(
                    "Checker stored under {} declares id {}, skipping",
                    id, checker.id
                ),
                Err(e) => warn!("Failed to decode checker {}: {}", id, e),
            }
        }
        Ok(checkers)
    }
}
