use std::time::Duration;

use async_trait::async_trait;

use crate::entities::{IdSet, Node};
use checker_core::CheckerResult;

/// 节点分配集合存储
///
/// 单个节点键上的操作是原子的，跨节点不保证事务性：
/// 重新分配期间允许短暂的重复执行或无人执行。
#[async_trait]
pub trait ScheduleStorage: Send + Sync {
    /// 当前存活节点（委托给成员服务，不在此存储）
    async fn nodes(&self) -> CheckerResult<Vec<Node>>;

    /// 刷新每个节点分配集合的TTL，调度器停止维护超过 `ttl` 后集合过期
    async fn nodes_keep_alive(&self, nodes: &[Node], ttl: Duration) -> CheckerResult<()>;

    /// 删除节点的分配集合
    async fn remove_node(&self, node_id: &str) -> CheckerResult<()>;

    async fn get(&self, node_id: &str) -> CheckerResult<IdSet>;

    async fn add(&self, node_id: &str, id: i64) -> CheckerResult<()>;

    async fn del(&self, node_id: &str, id: i64) -> CheckerResult<()>;

    /// 遍历节点的分配集合，回调返回 `false` 时停止
    async fn for_each(
        &self,
        node_id: &str,
        f: &mut (dyn FnMut(i64) -> bool + Send),
    ) -> CheckerResult<()>;
}
