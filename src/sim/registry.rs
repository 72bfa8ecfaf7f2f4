//! 共享对象注册表
//!
//! 按类别保存仿真全局共享对象：应用软件、CDF、插件路径。

use parking_lot::RwLock;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

/// 注册表类别。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    Software,
    Cdfs,
    PluginPaths,
}

type StorageMap = RwLock<HashMap<String, Arc<dyn Any + Send + Sync>>>;

/// 类别 -> id -> 对象 的两级映射。对象归注册表所有（`Arc` 共享）。
#[derive(Default)]
pub struct Registry {
    software: StorageMap,
    cdfs: StorageMap,
    plugin_paths: StorageMap,
}

impl Registry {
    pub fn new() -> Registry {
        Registry::default()
    }

    fn table(&self, kind: StorageKind) -> &StorageMap {
        match kind {
            StorageKind::Software => &self.software,
            StorageKind::Cdfs => &self.cdfs,
            StorageKind::PluginPaths => &self.plugin_paths,
        }
    }

    pub fn put(
        &self,
        kind: StorageKind,
        id: impl Into<String>,
        item: Arc<dyn Any + Send + Sync>,
    ) {
        self.table(kind).write().insert(id.into(), item);
    }

    pub fn get(&self, kind: StorageKind, id: &str) -> Option<Arc<dyn Any + Send + Sync>> {
        self.table(kind).read().get(id).cloned()
    }
}
