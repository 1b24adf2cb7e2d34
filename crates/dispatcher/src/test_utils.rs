//! 单元测试共用的测试替身

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use checker_core::{CheckerError, CheckerResult};
use checker_domain::{Checker, CheckerSource};

/// 可以切换为失败状态的定义源包装
pub struct FlakySource {
    inner: Arc<dyn CheckerSource>,
    failing: AtomicBool,
}

impl FlakySource {
    pub fn new(inner: Arc<dyn CheckerSource>) -> Self {
        Self {
            inner,
            failing: AtomicBool::new(false),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> CheckerResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(CheckerError::Source("source unavailable".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl CheckerSource for FlakySource {
    async fn list_ids(&self) -> CheckerResult<Vec<i64>> {
        self.check()?;
        self.inner.list_ids().await
    }

    async fn list_by_ids(&self, ids: &[i64]) -> CheckerResult<HashMap<i64, Checker>> {
        self.check()?;
        self.inner.list_by_ids(ids).await
    }
}
