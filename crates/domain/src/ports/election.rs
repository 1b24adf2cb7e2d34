use async_trait::async_trait;
use tokio::sync::{broadcast, watch};

use crate::entities::Node;
use crate::events::NodeEvent;
use checker_core::CheckerResult;

/// 选主与成员服务
///
/// 保证任意时刻至多一个进程认为自己是Leader。
#[async_trait]
pub trait Election: Send + Sync {
    /// 当前进程的身份
    fn node(&self) -> Node;

    /// 当前存活的节点
    async fn nodes(&self) -> CheckerResult<Vec<Node>>;

    /// 领导权状态，`true` 表示本节点当前是Leader
    fn leadership(&self) -> watch::Receiver<bool>;

    /// 成员加入/离开通知
    fn watch_nodes(&self) -> broadcast::Receiver<NodeEvent>;
}
