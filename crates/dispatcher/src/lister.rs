use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use checker_core::CheckerResult;
use checker_domain::{Checker, CheckerSource, ScheduleStorage};

/// Dispatcher的数据来源：本节点应当运行的拨测完整定义
#[async_trait]
pub trait CheckerLister: Send + Sync {
    async fn list(&self) -> CheckerResult<HashMap<i64, Checker>>;
}

/// 从分配存储读取本节点的拨测ID，再到定义源解析完整定义
///
/// 已分配但在定义源中不存在的ID会被忽略，调度器下一次调度时清理。
pub struct AssignedCheckerLister {
    node_id: String,
    storage: Arc<dyn ScheduleStorage>,
    source: Arc<dyn CheckerSource>,
}

impl AssignedCheckerLister {
    pub fn new(
        node_id: impl Into<String>,
        storage: Arc<dyn ScheduleStorage>,
        source: Arc<dyn CheckerSource>,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            storage,
            source,
        }
    }
}

#[async_trait]
impl CheckerLister for AssignedCheckerLister {
    async fn list(&self) -> CheckerResult<HashMap<i64, Checker>> {
        let mut ids = Vec::new();
        self.storage
            .for_each(&self.node_id, &mut |id| {
                ids.push(id);
                true
            })
            .await?;

        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        ids.sort_unstable();
        self.source.list_by_ids(&ids).await
    }
}
