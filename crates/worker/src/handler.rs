//! 拨测协议的扩展点
//!
//! 具体协议（HTTP/TCP/DNS等）以 `Plugin` 的形式注册到 `HandlerRegistry`，
//! 调度引擎本身不包含任何协议实现。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::info;

use checker_core::{CheckerError, CheckerResult};
use checker_domain::Checker;

use crate::context::TaskContext;

/// 执行一次拨测
#[async_trait]
pub trait Handler: Send + Sync {
    async fn execute(&self, ctx: &TaskContext) -> CheckerResult<()>;
}

/// 可选能力：持有需要显式释放的资源（连接池、socket等）
#[async_trait]
pub trait Closeable: Send + Sync {
    async fn close(&self);
}

/// 插件创建的可执行拨测，是否可关闭在创建时确定
#[derive(Clone)]
pub struct Probe {
    handler: Arc<dyn Handler>,
    closer: Option<Arc<dyn Closeable>>,
}

impl Probe {
    pub fn new<H: Handler + 'static>(handler: H) -> Self {
        Self {
            handler: Arc::new(handler),
            closer: None,
        }
    }

    pub fn closeable<H: Handler + Closeable + 'static>(handler: H) -> Self {
        let handler = Arc::new(handler);
        Self {
            handler: handler.clone(),
            closer: Some(handler),
        }
    }

    pub fn is_closeable(&self) -> bool {
        self.closer.is_some()
    }

    pub async fn execute(&self, ctx: &TaskContext) -> CheckerResult<()> {
        self.handler.execute(ctx).await
    }

    pub async fn close(&self) {
        if let Some(closer) = &self.closer {
            closer.close().await;
        }
    }
}

/// 某一拨测类型的插件
pub trait Plugin: Send + Sync {
    /// 校验拨测定义的协议参数
    fn validate(&self, checker: &Checker) -> CheckerResult<()>;

    fn create(&self, checker: &Checker) -> CheckerResult<Probe>;
}

#[async_trait]
pub trait PluginRegistry: Send + Sync {
    async fn validate(&self, checker: &Checker) -> CheckerResult<()>;

    async fn create(&self, checker: &Checker) -> CheckerResult<Probe>;
}

/// 按拨测类型（`Checker::checker_type`）索引的插件注册表
pub struct HandlerRegistry {
    plugins: RwLock<HashMap<String, Arc<dyn Plugin>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            plugins: RwLock::new(HashMap::new()),
        }
    }

    pub async fn register(&self, checker_type: impl Into<String>, plugin: Arc<dyn Plugin>) {
        let checker_type = checker_type.into();
        info!("Registered checker plugin '{}'", checker_type);
        self.plugins.write().await.insert(checker_type, plugin);
    }

    pub async fn unregister(&self, checker_type: &str) -> bool {
        self.plugins.write().await.remove(checker_type).is_some()
    }

    pub async fn contains(&self, checker_type: &str) -> bool {
        self.plugins.read().await.contains_key(checker_type)
    }

    pub async fn list_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.plugins.read().await.keys().cloned().collect();
        types.sort();
        types
    }

    async fn plugin(&self, checker_type: &str) -> CheckerResult<Arc<dyn Plugin>> {
        self.plugins
            .read()
            .await
            .get(checker_type)
            .cloned()
            .ok_or_else(|| CheckerError::UnknownType(checker_type.to_string()))
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginRegistry for HandlerRegistry {
    async fn validate(&self, checker: &Checker) -> CheckerResult<()> {
        self.plugin(&checker.checker_type).await?.validate(checker)
    }

    async fn create(&self, checker: &Checker) -> CheckerResult<Probe> {
        self.plugin(&checker.checker_type).await?.create(checker)
    }
}
