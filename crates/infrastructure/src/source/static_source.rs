use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::watch;
use tracing::{debug, info};

use checker_core::{CheckerError, CheckerResult};
use checker_domain::{Checker, CheckerSource};

#[derive(Debug, Default, Deserialize)]
struct CheckerFile {
    #[serde(default)]
    checkers: Vec<Checker>,
}

/// 进程内的拨测定义源
///
/// 可以从TOML（`[[checkers]]`）或JSON文件加载，运行时通过 `put`/`remove`
/// 修改。每次修改递增版本号，Dispatcher订阅后无需等待定时加载。
pub struct StaticCheckerSource {
    checkers: RwLock<BTreeMap<i64, Checker>>,
    version: watch::Sender<u64>,
}

impl StaticCheckerSource {
    pub fn new(checkers: Vec<Checker>) -> CheckerResult<Self> {
        let mut map = BTreeMap::new();
        for checker in checkers {
            let id = checker.id;
            if map.insert(id, checker).is_some() {
                return Err(CheckerError::invalid_checker(id, "重复的拨测ID"));
            }
        }
        let (version, _) = watch::channel(0);
        Ok(Self {
            checkers: RwLock::new(map),
            version,
        })
    }

    pub fn empty() -> Self {
        let (version, _) = watch::channel(0);
        Self {
            checkers: RwLock::new(BTreeMap::new()),
            version,
        }
    }

    /// 从文件加载，`.json` 按JSON解析，其余按TOML解析
    pub fn from_file(path: impl AsRef<Path>) -> CheckerResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            CheckerError::Source(format!("读取拨测定义文件 {} 失败: {e}", path.display()))
        })?;

        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let file: CheckerFile = if is_json {
            serde_json::from_str(&content)?
        } else {
            toml::from_str(&content).map_err(|e| {
                CheckerError::Source(format!("解析拨测定义文件 {} 失败: {e}", path.display()))
            })?
        };

        info!(
            "Loaded {} checkers from {}",
            file.checkers.len(),
            path.display()
        );
        Self::new(file.checkers)
    }

    /// 新增或替换定义
    pub fn put(&self, checker: Checker) {
        debug!("Put checker {} into static source", checker.id);
        self.write().insert(checker.id, checker);
        self.bump();
    }

    pub fn remove(&self, id: i64) -> Option<Checker> {
        let removed = self.write().remove(&id);
        if removed.is_some() {
            debug!("Removed checker {} from static source", id);
            self.bump();
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn bump(&self) {
        self.version.send_modify(|v| *v += 1);
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<i64, Checker>> {
        self.checkers.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<i64, Checker>> {
        self.checkers.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl CheckerSource for StaticCheckerSource {
    async fn list_ids(&self) -> CheckerResult<Vec<i64>> {
        Ok(self.read().keys().copied().collect())
    }

    async fn list_by_ids(&self, ids: &[i64]) -> CheckerResult<HashMap<i64, Checker>> {
        let checkers = self.read();
        Ok(ids
            .iter()
            .filter_map(|id| checkers.get(id).map(|c| (*id, c.clone())))
            .collect())
    }

    fn changes(&self) -> Option<watch::Receiver<u64>> {
        Some(self.version.subscribe())
    }
}
