//! 暂存注册表
//!
//! 记录每个部署目标已暂存但尚未提交的 ConfigurationBundle。
//! 注册表只存在于进程内存中，进程重启后暂存内容需要由调用方重新暂存。

use kube::ResourceExt;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

use sveltos_common::ConfigurationBundle;

/// 暂存注册表的键
///
/// 不包含请求方类型：同一请求方名称和功能在一个集群上只有一份暂存内容。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StagingKey {
    pub cluster_namespace: String,
    pub cluster_name: String,
    pub requestor_name: String,
    pub requestor_feature: String,
}

/// 单个部署目标的暂存内容
#[derive(Debug, Default)]
struct StagedBundles {
    /// 按首次暂存顺序排列的名称
    order: Vec<String>,
    /// 名称到最新快照
    snapshots: HashMap<String, ConfigurationBundle>,
}

/// 暂存注册表
///
/// 通过 `Arc` 在多个 [`crate::PullModeClient`] 之间共享。
#[derive(Debug, Default)]
pub struct StagingRegistry {
    entries: RwLock<HashMap<StagingKey, StagedBundles>>,
}

impl StagingRegistry {
    /// 创建空的暂存注册表
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录一个已暂存的 ConfigurationBundle
    ///
    /// 同名对象只保留最新快照，位置保持首次暂存时的顺序。
    pub async fn store_bundle(&self, key: &StagingKey, bundle: ConfigurationBundle) {
        let name = bundle.name_any();
        let mut entries = self.entries.write().await;
        let staged = entries.entry(key.clone()).or_default();

        if !staged.snapshots.contains_key(&name) {
            staged.order.push(name.clone());
        }
        staged.snapshots.insert(name.clone(), bundle);
        debug!("暂存 ConfigurationBundle {}，当前共 {} 个", name, staged.order.len());
    }

    /// 按暂存顺序返回已暂存的 ConfigurationBundle
    pub async fn get_bundles(&self, key: &StagingKey) -> Vec<ConfigurationBundle> {
        let entries = self.entries.read().await;
        match entries.get(key) {
            Some(staged) => staged
                .order
                .iter()
                .filter_map(|name| staged.snapshots.get(name).cloned())
                .collect(),
            None => Vec::new(),
        }
    }

    /// 清空部署目标的暂存内容
    pub async fn clear_bundles(&self, key: &StagingKey) {
        if self.entries.write().await.remove(key).is_some() {
            debug!(
                "清空暂存内容 {}/{} {}/{}",
                key.cluster_namespace, key.cluster_name, key.requestor_name, key.requestor_feature
            );
        }
    }

    /// 仅当全部快照都满足条件时清空暂存内容，返回是否清空
    pub async fn clear_bundles_if<F>(&self, key: &StagingKey, predicate: F) -> bool
    where
        F: Fn(&ConfigurationBundle) -> bool,
    {
        let mut entries = self.entries.write().await;
        let matches = match entries.get(key) {
            Some(staged) => staged.snapshots.values().all(|bundle| predicate(bundle)),
            None => return false,
        };
        if !matches {
            debug!("暂存内容 {}/{} 属于其他请求方，保留", key.requestor_name, key.requestor_feature);
            return false;
        }
        entries.remove(key);
        true
    }

    /// 部署目标是否有暂存内容
    pub async fn has_bundles(&self, key: &StagingKey) -> bool {
        self.entries
            .read()
            .await
            .get(key)
            .map(|staged| !staged.order.is_empty())
            .unwrap_or(false)
    }

    /// 注册表是否为空
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
