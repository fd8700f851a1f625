//! 对象存储模块
//!
//! 该模块抽象了拉取模式所需的对象存储操作（增删改查与按标签列举），
//! 返回具体类型而非动态对象。生产环境使用 [`KubeStore`]，
//! 测试和本地场景使用 [`MemoryStore`]。

mod kube_store;
mod memory;

pub use kube_store::KubeStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use k8s_openapi::NamespaceResourceScope;
use kube::{Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Debug;
use tracing::{debug, warn};

use sveltos_common::{Error, Result};

/// 可存入对象存储的命名空间级资源
pub trait StoredObject:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
}

impl<K> StoredObject for K where
    K: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static
{
}

/// 对象存储客户端
#[async_trait]
pub trait ObjectStore<K: StoredObject>: Send + Sync {
    /// 读取对象，不存在时返回 [`Error::NotFound`]
    async fn get(&self, namespace: &str, name: &str) -> Result<K>;

    /// 创建对象，忽略其中的状态
    async fn create(&self, object: &K) -> Result<K>;

    /// 更新对象规范与元数据，忽略其中的状态
    async fn update(&self, object: &K) -> Result<K>;

    /// 通过状态子资源更新状态
    async fn update_status(&self, object: &K) -> Result<K>;

    /// 删除对象，不存在时返回 [`Error::NotFound`]
    async fn delete(&self, namespace: &str, name: &str) -> Result<()>;

    /// 列举命名空间中带有全部给定标签的对象
    async fn list(&self, namespace: &str, labels: &BTreeMap<String, String>) -> Result<Vec<K>>;
}

/// 资源类型名称，用于日志和错误信息
pub(crate) fn kind_of<K: StoredObject>() -> String {
    K::kind(&()).to_string()
}

/// 删除对象，对象已不存在时视为成功
pub(crate) async fn delete_ignore_not_found<K: StoredObject>(
    store: &dyn ObjectStore<K>,
    namespace: &str,
    name: &str,
) -> Result<()> {
    match store.delete(namespace, name).await {
        Ok(()) => {
            debug!("已删除 {} {}/{}", kind_of::<K>(), namespace, name);
            Ok(())
        }
        Err(e) if e.is_not_found() => Ok(()),
        Err(e) => Err(e),
    }
}

/// 查找某个标签集合下唯一的对象
///
/// 列出命名空间中带有 `labels` 且满足 `filter` 的对象：
/// 没有则返回 `None`，恰好一个则返回它。找到多个说明发生了并发创建，
/// 此时尽力删除全部对象并返回 [`Error::Duplicate`]，由调用方重试后收敛到唯一对象。
pub(crate) async fn find_singleton<K, F>(
    store: &dyn ObjectStore<K>,
    namespace: &str,
    labels: &BTreeMap<String, String>,
    filter: F,
) -> Result<Option<K>>
where
    K: StoredObject,
    F: Fn(&K) -> bool + Send,
{
    let mut matches: Vec<K> = store
        .list(namespace, labels)
        .await?
        .into_iter()
        .filter(|object| filter(object))
        .collect();

    if matches.len() <= 1 {
        return Ok(matches.pop());
    }

    let kind = kind_of::<K>();
    warn!(
        "命名空间 {} 中找到 {} 个 {} 对象，删除全部后重试",
        namespace,
        matches.len(),
        kind
    );

    for object in &matches {
        // 主错误已确定，这里的删除失败只记录
        if let Err(e) = delete_ignore_not_found(store, namespace, &object.name_any()).await {
            warn!("删除重复的 {} {}/{} 失败: {}", kind, namespace, object.name_any(), e);
        }
    }

    Err(Error::Duplicate {
        kind,
        namespace: namespace.to_string(),
        count: matches.len(),
    })
}

/// 对象已被标记删除时返回 [`Error::DeletionInProgress`]
pub(crate) fn ensure_not_deleting<K: StoredObject>(object: &K) -> Result<()> {
    if object.meta().deletion_timestamp.is_some() {
        return Err(Error::deletion_in_progress(
            &kind_of::<K>(),
            &object.namespace().unwrap_or_default(),
            &object.name_any(),
        ));
    }
    Ok(())
}
