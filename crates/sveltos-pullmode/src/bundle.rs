//! ConfigurationBundle 管理
//!
//! 每个（集群，请求方，功能，索引）组合最多有一个已提交的 ConfigurationBundle，
//! 暂存期间另有一个带暂存标签的副本。对象名称随机生成，之后通过标签和注解查找。

use k8s_openapi::api::core::v1::ObjectReference;
use k8s_openapi::ByteString;
use kube::api::{DynamicObject, ObjectMeta};
use kube::{Resource, ResourceExt};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

use sveltos_common::{
    ConfigurationBundle, ConfigurationBundleSpec, ConfigurationBundleStatus, ConfigurationItem,
    PullModeSettings, Result,
};

use crate::labels::{self, INDEX_ANNOTATION, STAGED_LABEL, STAGED_LABEL_VALUE};
use crate::options::BundleOptions;
use crate::store::{delete_ignore_not_found, ensure_not_deleting, find_singleton, ObjectStore};
use crate::target::DeploymentTarget;
use crate::utils::{compute_hash, generate_name, render_resources, retry_on_conflict, strip_server_fields};

/// ConfigurationBundle 名称前缀
const BUNDLE_NAME_PREFIX: &str = "cb";

/// 指向 ConfigurationBundle 的对象引用
pub fn content_ref(bundle: &ConfigurationBundle) -> ObjectReference {
    ObjectReference {
        api_version: Some(ConfigurationBundle::api_version(&()).to_string()),
        kind: Some(ConfigurationBundle::kind(&()).to_string()),
        namespace: bundle.namespace(),
        name: Some(bundle.name_any()),
        ..Default::default()
    }
}

/// ConfigurationGroup 中引用该 ConfigurationBundle 的配置项
pub fn configuration_item(bundle: &ConfigurationBundle) -> ConfigurationItem {
    ConfigurationItem {
        content_ref: content_ref(bundle),
        hash: bundle.hash().map(|hash| ByteString(hash.to_vec())),
    }
}

/// 写入一个 ConfigurationBundle 所需的内容
struct BundleContent<'a> {
    index: &'a str,
    resources: Vec<String>,
    hash: Vec<u8>,
    not_tracked: bool,
    staged: bool,
    options: &'a BundleOptions,
}

/// ConfigurationBundle 管理器
pub struct BundleManager {
    /// 对象存储
    store: Arc<dyn ObjectStore<ConfigurationBundle>>,
    /// 运行参数
    settings: PullModeSettings,
}

impl BundleManager {
    /// 创建新的 ConfigurationBundle 管理器
    pub fn new(store: Arc<dyn ObjectStore<ConfigurationBundle>>, settings: PullModeSettings) -> Self {
        Self { store, settings }
    }

    /// 查找某个索引下的 ConfigurationBundle
    ///
    /// `staged` 决定查找暂存副本还是已提交的对象。
    pub async fn find_bundle(
        &self,
        target: &DeploymentTarget,
        index: &str,
        staged: bool,
    ) -> Result<Option<ConfigurationBundle>> {
        find_singleton(
            self.store.as_ref(),
            &target.cluster_namespace,
            &target.labels(),
            |bundle: &ConfigurationBundle| {
                target.owns(bundle)
                    && labels::annotation(bundle, INDEX_ANNOTATION) == Some(index)
                    && labels::is_staged(bundle) == staged
            },
        )
        .await
    }

    /// 创建或更新某个索引下的 ConfigurationBundle，并写入内容哈希
    ///
    /// 对象正在删除时返回 [`sveltos_common::Error::DeletionInProgress`]。
    pub async fn reconcile_bundle(
        &self,
        target: &DeploymentTarget,
        index: &str,
        resources: &[DynamicObject],
        not_tracked: bool,
        staged: bool,
        options: &BundleOptions,
    ) -> Result<ConfigurationBundle> {
        let stripped: Vec<DynamicObject> = resources.iter().map(strip_server_fields).collect();
        let content = BundleContent {
            index,
            resources: render_resources(&stripped)?,
            hash: compute_hash(&stripped)?,
            not_tracked,
            staged,
            options,
        };

        let content = &content;
        retry_on_conflict(&self.settings, move || async move {
            self.write_bundle(target, content).await
        })
        .await
    }

    async fn write_bundle(
        &self,
        target: &DeploymentTarget,
        content: &BundleContent<'_>,
    ) -> Result<ConfigurationBundle> {
        let written = match self.find_bundle(target, content.index, content.staged).await? {
            Some(mut existing) => {
                ensure_not_deleting(&existing)?;
                Self::fill(&mut existing, target, content);
                let updated = self.store.update(&existing).await?;
                debug!("更新 ConfigurationBundle {} ({})", updated.name_any(), target);
                updated
            }
            None => {
                let mut bundle = ConfigurationBundle {
                    metadata: ObjectMeta {
                        name: Some(generate_name(
                            BUNDLE_NAME_PREFIX,
                            self.settings.name_suffix_length,
                        )),
                        namespace: Some(target.cluster_namespace.clone()),
                        ..Default::default()
                    },
                    spec: ConfigurationBundleSpec::default(),
                    status: None,
                };
                Self::fill(&mut bundle, target, content);
                let created = self.store.create(&bundle).await?;
                info!(
                    "创建 ConfigurationBundle {} ({} 索引 {})",
                    created.name_any(),
                    target,
                    content.index
                );
                created
            }
        };

        let mut with_status = written;
        with_status.status = Some(ConfigurationBundleStatus {
            hash: Some(ByteString(content.hash.clone())),
        });
        self.store.update_status(&with_status).await
    }

    /// 写入规范、标签和注解
    fn fill(bundle: &mut ConfigurationBundle, target: &DeploymentTarget, content: &BundleContent<'_>) {
        bundle.labels_mut().extend(target.labels());
        if content.staged {
            bundle
                .labels_mut()
                .insert(STAGED_LABEL.to_string(), STAGED_LABEL_VALUE.to_string());
        } else {
            bundle.labels_mut().remove(STAGED_LABEL);
        }
        bundle
            .annotations_mut()
            .extend(target.bundle_annotations(content.index));

        bundle.spec.resources = content.resources.clone();
        bundle.spec.not_tracked = content.not_tracked;
        content.options.apply(&mut bundle.spec);
    }

    /// 列出部署目标的全部 ConfigurationBundle，包括暂存副本
    pub async fn list_bundles(&self, target: &DeploymentTarget) -> Result<Vec<ConfigurationBundle>> {
        Ok(self
            .store
            .list(&target.cluster_namespace, &target.labels())
            .await?
            .into_iter()
            .filter(|bundle| target.owns(bundle))
            .collect())
    }

    /// 删除未被引用的 ConfigurationBundle，返回删除的数量
    pub async fn delete_stale_bundles(
        &self,
        target: &DeploymentTarget,
        referenced: &HashSet<String>,
    ) -> Result<usize> {
        let mut deleted = 0;
        for bundle in self.list_bundles(target).await? {
            let name = bundle.name_any();
            if referenced.contains(&name) {
                continue;
            }
            delete_ignore_not_found(self.store.as_ref(), &target.cluster_namespace, &name).await?;
            deleted += 1;
        }

        if deleted > 0 {
            info!("删除 {} 个过期的 ConfigurationBundle ({})", deleted, target);
        }
        Ok(deleted)
    }

    /// 删除部署目标的全部 ConfigurationBundle
    pub async fn delete_all_bundles(&self, target: &DeploymentTarget) -> Result<usize> {
        self.delete_stale_bundles(target, &HashSet::new()).await
    }

    /// 去掉暂存标签，使 ConfigurationBundle 成为已提交的对象
    ///
    /// 每次尝试都重新读取最新版本，冲突时按退避策略重试。
    pub async fn clear_staged_marker(&self, namespace: &str, name: &str) -> Result<ConfigurationBundle> {
        retry_on_conflict(&self.settings, move || async move {
            let mut bundle = self.store.get(namespace, name).await?;
            if bundle.labels_mut().remove(STAGED_LABEL).is_none() {
                return Ok(bundle);
            }
            self.store.update(&bundle).await
        })
        .await
    }
}
