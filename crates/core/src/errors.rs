use thiserror::Error;

/// 拨测调度引擎错误类型定义
#[derive(Debug, Error)]
pub enum CheckerError {
    #[error("调度存储错误: {0}")]
    Storage(String),

    #[error("集群成员服务错误: {0}")]
    Membership(String),

    #[error("拨测定义源错误: {0}")]
    Source(String),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("无效的拨测定义 {id}: {message}")]
    InvalidChecker { id: i64, message: String },

    #[error("未注册的拨测类型: {0}")]
    UnknownType(String),

    #[error("不支持的调度策略: {0}")]
    UnsupportedStrategy(String),

    #[error("拨测执行错误: {0}")]
    Execution(String),

    #[error("指标上报错误: {0}")]
    Sink(String),

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

impl CheckerError {
    pub fn invalid_checker<S: Into<String>>(id: i64, message: S) -> Self {
        Self::InvalidChecker {
            id,
            message: message.into(),
        }
    }

    pub fn config_error<S: Into<String>>(message: S) -> Self {
        Self::Configuration(message.into())
    }

    /// 单个拨测自身的问题（校验、实例化、参数解析），不应影响其他拨测
    pub fn is_checker_scoped(&self) -> bool {
        matches!(
            self,
            Self::InvalidChecker { .. } | Self::UnknownType(_) | Self::UnsupportedStrategy(_)
        )
    }
}

impl From<redis::RedisError> for CheckerError {
    fn from(err: redis::RedisError) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for CheckerError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// 统一的Result类型
pub type CheckerResult<T> = std::result::Result<T, CheckerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checker_scoped_errors() {
        assert!(CheckerError::invalid_checker(1, "bad interval").is_checker_scoped());
        assert!(CheckerError::UnknownType("dns".to_string()).is_checker_scoped());
        assert!(!CheckerError::Storage("connection reset".to_string()).is_checker_scoped());
    }

    #[test]
    fn test_error_display() {
        let err = CheckerError::invalid_checker(42, "interval must be positive");
        assert_eq!(err.to_string(), "无效的拨测定义 42: interval must be positive");
    }
}
