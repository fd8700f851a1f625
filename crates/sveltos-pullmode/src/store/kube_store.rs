//! 基于 kube-rs 的对象存储
//!
//! 通过 Kubernetes API 服务器读写对象，404 映射为 [`Error::NotFound`]，
//! 409 保留为 API 错误并可由 `Error::is_conflict` 识别。

use async_trait::async_trait;
use kube::api::{Api, DeleteParams, ListParams, PostParams};
use kube::{Client, ResourceExt};
use std::collections::BTreeMap;
use tracing::debug;

use sveltos_common::{Error, Result};

use super::{kind_of, ObjectStore, StoredObject};

/// Kubernetes 对象存储
#[derive(Clone)]
pub struct KubeStore {
    /// Kubernetes 客户端
    client: Client,
}

impl KubeStore {
    /// 创建新的 Kubernetes 对象存储
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api<K: StoredObject>(&self, namespace: &str) -> Api<K> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

/// 取出对象的命名空间和名称
fn object_key<K: StoredObject>(object: &K) -> Result<(String, String)> {
    let namespace = object.namespace().ok_or_else(|| {
        Error::InvalidResource(format!("{} {} 缺少命名空间", kind_of::<K>(), object.name_any()))
    })?;
    let name = object
        .meta()
        .name
        .clone()
        .ok_or_else(|| Error::InvalidResource(format!("{} 缺少名称", kind_of::<K>())))?;
    Ok((namespace, name))
}

/// 将标签集合转换为标签选择器
fn label_selector(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}

fn map_not_found(error: kube::Error, kind: &str, namespace: &str, name: &str) -> Error {
    match error {
        kube::Error::Api(response) if response.code == 404 => Error::not_found(kind, namespace, name),
        other => Error::Kube(other),
    }
}

#[async_trait]
impl<K: StoredObject> ObjectStore<K> for KubeStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<K> {
        match self.api::<K>(namespace).get_opt(name).await? {
            Some(object) => Ok(object),
            None => Err(Error::not_found(&kind_of::<K>(), namespace, name)),
        }
    }

    async fn create(&self, object: &K) -> Result<K> {
        let (namespace, name) = object_key(object)?;
        let created = self
            .api::<K>(&namespace)
            .create(&PostParams::default(), object)
            .await?;
        debug!("已创建 {} {}/{}", kind_of::<K>(), namespace, name);
        Ok(created)
    }

    async fn update(&self, object: &K) -> Result<K> {
        let (namespace, name) = object_key(object)?;
        self.api::<K>(&namespace)
            .replace(&name, &PostParams::default(), object)
            .await
            .map_err(|e| map_not_found(e, &kind_of::<K>(), &namespace, &name))
    }

    async fn update_status(&self, object: &K) -> Result<K> {
        let (namespace, name) = object_key(object)?;
        let data = serde_json::to_vec(object)?;
        self.api::<K>(&namespace)
            .replace_status(&name, &PostParams::default(), data)
            .await
            .map_err(|e| map_not_found(e, &kind_of::<K>(), &namespace, &name))
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<()> {
        self.api::<K>(namespace)
            .delete(name, &DeleteParams::default())
            .await
            .map(|_| ())
            .map_err(|e| map_not_found(e, &kind_of::<K>(), namespace, name))
    }

    async fn list(&self, namespace: &str, labels: &BTreeMap<String, String>) -> Result<Vec<K>> {
        let params = ListParams::default().labels(&label_selector(labels));
        let objects = self.api::<K>(namespace).list(&params).await?;
        Ok(objects.items)
    }
}
