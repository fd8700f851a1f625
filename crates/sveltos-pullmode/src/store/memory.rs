//! 内存对象存储
//!
//! 在进程内模拟 API 服务器与拉取协议相关的行为：
//! - 创建时 `metadata.generation` 为 1，规范变化的更新才会递增；
//! - `update` 忽略状态，`update_status` 只修改状态；
//! - `resourceVersion` 不一致的写入返回冲突；
//! - 带 finalizer 的对象删除时只设置删除时间戳。

use async_trait::async_trait;
use chrono::Utc;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::ResourceExt;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use sveltos_common::{Error, Result};

use super::{kind_of, ObjectStore, StoredObject};

/// 生成名称时随机后缀的长度
const GENERATED_SUFFIX_LENGTH: usize = 5;

/// 内存对象存储
pub struct MemoryStore<K> {
    /// 以（命名空间，名称）为键的对象
    objects: RwLock<BTreeMap<(String, String), K>>,
    /// 单调递增的资源版本
    resource_version: AtomicU64,
}

impl<K: StoredObject> Default for MemoryStore<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: StoredObject> MemoryStore<K> {
    /// 创建空的内存对象存储
    pub fn new() -> Self {
        Self {
            objects: RwLock::new(BTreeMap::new()),
            resource_version: AtomicU64::new(0),
        }
    }

    /// 存储中的对象数量
    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    /// 存储是否为空
    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }

    fn next_resource_version(&self) -> String {
        (self.resource_version.fetch_add(1, Ordering::SeqCst) + 1).to_string()
    }

    fn conflict(object: &K, namespace: &str, message: &str) -> Error {
        Error::conflict(&kind_of::<K>(), namespace, &object.name_any(), message)
    }

    /// 写入前检查 resourceVersion
    fn check_resource_version(incoming: &K, stored: &K, namespace: &str) -> Result<()> {
        match incoming.resource_version() {
            Some(version) if Some(&version) != stored.meta().resource_version.as_ref() => Err(
                Self::conflict(incoming, namespace, "对象已被修改，请基于最新版本重试"),
            ),
            _ => Ok(()),
        }
    }
}

fn to_value<K: StoredObject>(object: &K) -> Result<Value> {
    Ok(serde_json::to_value(object)?)
}

fn from_value<K: StoredObject>(value: Value) -> Result<K> {
    Ok(serde_json::from_value(value)?)
}

/// 用 `source` 中的某个顶层字段覆盖 `target` 中的同名字段
fn replace_field(target: &mut Value, source: &Value, field: &str) {
    if let Some(map) = target.as_object_mut() {
        match source.get(field) {
            Some(value) if !value.is_null() => {
                map.insert(field.to_string(), value.clone());
            }
            _ => {
                map.remove(field);
            }
        }
    }
}

fn random_suffix() -> String {
    Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .take(GENERATED_SUFFIX_LENGTH)
        .collect()
}

#[async_trait]
impl<K: StoredObject> ObjectStore<K> for MemoryStore<K> {
    async fn get(&self, namespace: &str, name: &str) -> Result<K> {
        self.objects
            .read()
            .await
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| Error::not_found(&kind_of::<K>(), namespace, name))
    }

    async fn create(&self, object: &K) -> Result<K> {
        let namespace = object.namespace().ok_or_else(|| {
            Error::InvalidResource(format!("{} {} 缺少命名空间", kind_of::<K>(), object.name_any()))
        })?;

        let mut created = object.clone();
        let name = match (&created.meta().name, &created.meta().generate_name) {
            (Some(name), _) => name.clone(),
            (None, Some(prefix)) => format!("{}{}", prefix, random_suffix()),
            (None, None) => {
                return Err(Error::InvalidResource(format!("{} 缺少名称", kind_of::<K>())))
            }
        };

        let mut objects = self.objects.write().await;
        let key = (namespace.clone(), name.clone());
        if objects.contains_key(&key) {
            return Err(Self::conflict(object, &namespace, "对象已存在"));
        }

        // 创建时忽略状态
        let mut value = to_value(&created)?;
        replace_field(&mut value, &Value::Null, "status");
        created = from_value(value)?;

        let meta = created.meta_mut();
        meta.name = Some(name);
        meta.uid = Some(Uuid::new_v4().to_string());
        meta.generation = Some(1);
        meta.creation_timestamp = Some(Time(Utc::now()));
        meta.deletion_timestamp = None;
        meta.resource_version = Some(self.next_resource_version());

        objects.insert(key, created.clone());
        debug!("内存存储创建 {} {}", kind_of::<K>(), created.name_any());
        Ok(created)
    }

    async fn update(&self, object: &K) -> Result<K> {
        let namespace = object.namespace().unwrap_or_default();
        let key = (namespace.clone(), object.name_any());

        let mut objects = self.objects.write().await;
        let stored = objects
            .get(&key)
            .ok_or_else(|| Error::not_found(&kind_of::<K>(), &namespace, &key.1))?;
        Self::check_resource_version(object, stored, &namespace)?;

        let stored_value = to_value(stored)?;
        let mut value = to_value(object)?;
        replace_field(&mut value, &stored_value, "status");
        let spec_changed = value.get("spec") != stored_value.get("spec");

        let mut updated: K = from_value(value)?;
        let stored_meta = stored.meta().clone();
        let meta = updated.meta_mut();
        meta.uid = stored_meta.uid;
        meta.creation_timestamp = stored_meta.creation_timestamp;
        meta.deletion_timestamp = stored_meta.deletion_timestamp;
        meta.generation = match stored_meta.generation {
            Some(generation) if spec_changed => Some(generation + 1),
            other => other,
        };
        meta.resource_version = Some(self.next_resource_version());

        // 删除中的对象去掉全部 finalizer 后真正删除
        let finalized = updated.meta().deletion_timestamp.is_some() && updated.finalizers().is_empty();
        if finalized {
            objects.remove(&key);
        } else {
            objects.insert(key, updated.clone());
        }
        Ok(updated)
    }

    async fn update_status(&self, object: &K) -> Result<K> {
        let namespace = object.namespace().unwrap_or_default();
        let key = (namespace.clone(), object.name_any());

        let mut objects = self.objects.write().await;
        let stored = objects
            .get(&key)
            .ok_or_else(|| Error::not_found(&kind_of::<K>(), &namespace, &key.1))?;
        Self::check_resource_version(object, stored, &namespace)?;

        let mut value = to_value(stored)?;
        replace_field(&mut value, &to_value(object)?, "status");

        let mut updated: K = from_value(value)?;
        updated.meta_mut().resource_version = Some(self.next_resource_version());
        objects.insert(key, updated.clone());
        Ok(updated)
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<()> {
        let key = (namespace.to_string(), name.to_string());
        let mut objects = self.objects.write().await;

        let has_finalizers = match objects.get(&key) {
            Some(stored) => !stored.finalizers().is_empty(),
            None => return Err(Error::not_found(&kind_of::<K>(), namespace, name)),
        };

        if has_finalizers {
            let resource_version = self.next_resource_version();
            if let Some(stored) = objects.get_mut(&key) {
                let meta = stored.meta_mut();
                if meta.deletion_timestamp.is_none() {
                    meta.deletion_timestamp = Some(Time(Utc::now()));
                }
                meta.resource_version = Some(resource_version);
            }
        } else {
            objects.remove(&key);
        }
        Ok(())
    }

    async fn list(&self, namespace: &str, labels: &BTreeMap<String, String>) -> Result<Vec<K>> {
        let objects = self.objects.read().await;
        Ok(objects
            .iter()
            .filter(|((ns, _), _)| ns == namespace)
            .filter(|(_, object)| {
                let object_labels = object.labels();
                labels
                    .iter()
                    .all(|(k, v)| object_labels.get(k) == Some(v))
            })
            .map(|(_, object)| object.clone())
            .collect())
    }
}
