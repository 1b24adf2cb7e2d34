use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::watch;

use crate::entities::Checker;
use checker_core::CheckerResult;

/// 拨测定义源（只读）
#[async_trait]
pub trait CheckerSource: Send + Sync {
    /// 全量拨测ID
    async fn list_ids(&self) -> CheckerResult<Vec<i64>>;

    /// 按ID解析完整定义，不存在的ID不出现在结果中
    async fn list_by_ids(&self, ids: &[i64]) -> CheckerResult<HashMap<i64, Checker>>;

    /// 定义变更信号。静态源在 put/remove 时递增版本号，多次变更会合并为一次通知；
    /// 远程源返回 `None`，只依赖定时加载。
    fn changes(&self) -> Option<watch::Receiver<u64>> {
        None
    }
}
