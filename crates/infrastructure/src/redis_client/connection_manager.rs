use std::time::Duration;

use redis::aio::ConnectionManager;
use redis::{Client, Cmd, FromRedisValue, Pipeline};
use tokio::time::sleep;
use tracing::{debug, error, warn};

use checker_core::{CheckerError, CheckerResult};

const MAX_CONNECT_ATTEMPTS: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_secs(1);

/// 共享的异步Redis连接
///
/// `ConnectionManager` 在断线后自动重连，克隆代价很低，
/// 存储、定义源和选主组件各自持有一个克隆。
#[derive(Clone)]
pub struct RedisConnectionManager {
    manager: ConnectionManager,
    url: String,
}

impl RedisConnectionManager {
    pub async fn new(url: &str) -> CheckerResult<Self> {
        let client = Client::open(url).map_err(|e| {
            CheckerError::Storage(format!("Failed to create Redis client: {e}"))
        })?;

        let mut last_error = None;
        for attempt in 0..MAX_CONNECT_ATTEMPTS {
            match ConnectionManager::new(client.clone()).await {
                Ok(manager) => {
                    if attempt > 0 {
                        debug!("Connected to Redis after {} attempts", attempt + 1);
                    }
                    let conn = Self {
                        manager,
                        url: url.to_string(),
                    };
                    conn.ping().await?;
                    debug!("Successfully connected to Redis at {}", conn.url);
                    return Ok(conn);
                }
                Err(e) => {
                    if attempt + 1 < MAX_CONNECT_ATTEMPTS {
                        warn!(
                            "Failed to connect to Redis (attempt {}/{}): {}. Retrying in {:?}...",
                            attempt + 1,
                            MAX_CONNECT_ATTEMPTS,
                            e,
                            RETRY_DELAY
                        );
                        sleep(RETRY_DELAY).await;
                    }
                    last_error = Some(e);
                }
            }
        }

        let error_msg = format!(
            "Failed to connect to Redis after {} attempts. Last error: {}",
            MAX_CONNECT_ATTEMPTS,
            last_error.map_or("Unknown".to_string(), |e| e.to_string())
        );
        error!("{}", error_msg);
        Err(CheckerError::Storage(error_msg))
    }

    /// 获取一个连接句柄
    pub fn connection(&self) -> ConnectionManager {
        self.manager.clone()
    }

    /// 执行单条命令
    pub async fn execute_command<T: FromRedisValue>(&self, cmd: &mut Cmd) -> CheckerResult<T> {
        let mut conn = self.connection();
        Ok(cmd.query_async(&mut conn).await?)
    }

    /// 执行管道，管道内的命令按顺序发送
    pub async fn execute_pipeline(&self, pipe: &mut Pipeline) -> CheckerResult<()> {
        let mut conn = self.connection();
        let _: () = pipe.query_async(&mut conn).await?;
        Ok(())
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn ping(&self) -> CheckerResult<()> {
        let mut conn = self.connection();
        let response: String = redis::cmd("PING").query_async(&mut conn).await?;
        if response == "PONG" {
            Ok(())
        } else {
            let error_msg = format!("Unexpected PING response: {response}");
            error!("{}", error_msg);
            Err(CheckerError::Storage(error_msg))
        }
    }
}
