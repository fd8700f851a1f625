//! ConfigurationGroup 管理
//!
//! 每个部署目标对应唯一的 ConfigurationGroup。它列出当前有效的 ConfigurationBundle，
//! 并通过动作和更新阶段告诉拉取代理是否以及如何处理这些内容。

use kube::api::ObjectMeta;
use kube::ResourceExt;
use std::sync::Arc;
use tracing::{debug, info};

use sveltos_common::{
    Action, ConfigurationGroup, ConfigurationGroupSpec, ConfigurationItem, Error, PullModeSettings,
    Result, UpdatePhase,
};

use crate::options::GroupOptions;
use crate::store::{delete_ignore_not_found, ensure_not_deleting, find_singleton, ObjectStore};
use crate::target::DeploymentTarget;
use crate::utils::{generate_name, retry_on_conflict};

/// ConfigurationGroup 名称前缀
const GROUP_NAME_PREFIX: &str = "cg";

/// ConfigurationGroup 管理器
pub struct GroupManager {
    /// 对象存储
    store: Arc<dyn ObjectStore<ConfigurationGroup>>,
    /// 运行参数
    settings: PullModeSettings,
}

impl GroupManager {
    /// 创建新的 ConfigurationGroup 管理器
    pub fn new(store: Arc<dyn ObjectStore<ConfigurationGroup>>, settings: PullModeSettings) -> Self {
        Self { store, settings }
    }

    /// 查找部署目标的 ConfigurationGroup
    pub async fn find_group(&self, target: &DeploymentTarget) -> Result<Option<ConfigurationGroup>> {
        find_singleton(
            self.store.as_ref(),
            &target.cluster_namespace,
            &target.labels(),
            |group: &ConfigurationGroup| target.owns(group),
        )
        .await
    }

    /// 读取部署目标的 ConfigurationGroup，不存在时返回 [`Error::NotFound`]
    pub async fn get_group(&self, target: &DeploymentTarget) -> Result<ConfigurationGroup> {
        self.find_group(target).await?.ok_or_else(|| {
            Error::not_found(
                "ConfigurationGroup",
                &target.cluster_namespace,
                &target.to_string(),
            )
        })
    }

    /// 创建或更新 ConfigurationGroup
    ///
    /// 规范整体替换：配置项、动作、策略参数，阶段置为 Ready。
    /// 注解只合并不删除。
    pub async fn reconcile_group(
        &self,
        target: &DeploymentTarget,
        items: Vec<ConfigurationItem>,
        action: Action,
        options: &GroupOptions,
    ) -> Result<ConfigurationGroup> {
        let mut spec = ConfigurationGroupSpec {
            action,
            configuration_items: items,
            update_phase: UpdatePhase::Ready,
            ..Default::default()
        };
        options.apply(&mut spec);

        let spec = &spec;
        retry_on_conflict(&self.settings, move || async move {
            self.write_group(target, spec, options).await
        })
        .await
    }

    async fn write_group(
        &self,
        target: &DeploymentTarget,
        spec: &ConfigurationGroupSpec,
        options: &GroupOptions,
    ) -> Result<ConfigurationGroup> {
        match self.find_group(target).await? {
            Some(mut group) => {
                ensure_not_deleting(&group)?;
                group.labels_mut().extend(target.labels());
                group.annotations_mut().extend(target.annotations());
                group.annotations_mut().extend(options.annotations.clone());
                group.spec = spec.clone();

                let updated = self.store.update(&group).await?;
                debug!(
                    "更新 ConfigurationGroup {} ({}): {} 个配置项, 动作 {}",
                    updated.name_any(),
                    target,
                    updated.spec.configuration_items.len(),
                    updated.spec.action
                );
                Ok(updated)
            }
            None => {
                let mut annotations = target.annotations();
                annotations.extend(options.annotations.clone());

                let group = ConfigurationGroup {
                    metadata: ObjectMeta {
                        name: Some(generate_name(
                            GROUP_NAME_PREFIX,
                            self.settings.name_suffix_length,
                        )),
                        namespace: Some(target.cluster_namespace.clone()),
                        labels: Some(target.labels()),
                        annotations: Some(annotations),
                        ..Default::default()
                    },
                    spec: spec.clone(),
                    status: None,
                };

                let created = self.store.create(&group).await?;
                info!(
                    "创建 ConfigurationGroup {} ({}), 动作 {}",
                    created.name_any(),
                    target,
                    created.spec.action
                );
                Ok(created)
            }
        }
    }

    /// 修改已有 ConfigurationGroup 的更新阶段，不存在时返回 `None`
    async fn set_update_phase(
        &self,
        target: &DeploymentTarget,
        phase: UpdatePhase,
    ) -> Result<Option<ConfigurationGroup>> {
        retry_on_conflict(&self.settings, move || async move {
            let mut group = match self.find_group(target).await? {
                Some(group) => group,
                None => return Ok(None),
            };
            if group.spec.update_phase == phase {
                return Ok(Some(group));
            }
            ensure_not_deleting(&group)?;

            group.spec.update_phase = phase;
            let updated = self.store.update(&group).await?;
            debug!("ConfigurationGroup {} ({}) 进入 {} 阶段", updated.name_any(), target, phase);
            Ok(Some(updated))
        })
        .await
    }

    /// 将 ConfigurationGroup 标记为 Preparing，代理在此期间不处理它
    ///
    /// 配置项保持不变；不存在时不做任何事。
    pub async fn mark_group_as_preparing(
        &self,
        target: &DeploymentTarget,
    ) -> Result<Option<ConfigurationGroup>> {
        self.set_update_phase(target, UpdatePhase::Preparing).await
    }

    /// 将 ConfigurationGroup 恢复为 Ready，配置项和动作保持不变
    pub async fn mark_group_as_ready(
        &self,
        target: &DeploymentTarget,
    ) -> Result<Option<ConfigurationGroup>> {
        self.set_update_phase(target, UpdatePhase::Ready).await
    }

    /// 让代理移除之前部署的资源
    ///
    /// 清空配置项并将动作改为 Remove，不存在时创建。
    pub async fn mark_group_for_removal(
        &self,
        target: &DeploymentTarget,
        options: &GroupOptions,
    ) -> Result<ConfigurationGroup> {
        self.reconcile_group(target, Vec::new(), Action::Remove, options).await
    }

    /// 删除部署目标的 ConfigurationGroup，不存在时视为成功
    pub async fn delete_group(&self, target: &DeploymentTarget) -> Result<()> {
        if let Some(group) = self.find_group(target).await? {
            delete_ignore_not_found(self.store.as_ref(), &target.cluster_namespace, &group.name_any())
                .await?;
            info!("删除 ConfigurationGroup {} ({})", group.name_any(), target);
        }
        Ok(())
    }

    /// 当前 ConfigurationGroup 引用的 ConfigurationBundle 名称
    pub async fn get_referenced_bundles(&self, target: &DeploymentTarget) -> Result<Vec<String>> {
        Ok(self
            .find_group(target)
            .await?
            .map(|group| group.referenced_bundle_names())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::testing::target;
    use k8s_openapi::api::core::v1::ObjectReference;
    use k8s_openapi::ByteString;

    fn manager() -> (Arc<MemoryStore<ConfigurationGroup>>, GroupManager) {
        let store = Arc::new(MemoryStore::<ConfigurationGroup>::new());
        let manager = GroupManager::new(store.clone(), PullModeSettings::default());
        (store, manager)
    }

    fn item(name: &str) -> ConfigurationItem {
        ConfigurationItem {
            content_ref: ObjectReference {
                name: Some(name.to_string()),
                namespace: Some("capi".to_string()),
                ..Default::default()
            },
            hash: None,
        }
    }

    #[tokio::test]
    async fn test_reconcile_creates_then_updates() {
        let (store, manager) = manager();
        let target = target("Helm");

        let created = manager
            .reconcile_group(&target, vec![item("cb-1")], Action::Deploy, &GroupOptions::default())
            .await
            .unwrap();
        assert!(created.name_any().starts_with("cg-"));
        assert_eq!(created.metadata.generation, Some(1));
        assert_eq!(created.spec.update_phase, UpdatePhase::Ready);

        let options = GroupOptions::new()
            .with_requestor_hash(&[1])
            .with_annotation("example.io/note", "x");
        let updated = manager
            .reconcile_group(&target, vec![item("cb-1"), item("cb-2")], Action::Deploy, &options)
            .await
            .unwrap();
        assert_eq!(updated.name_any(), created.name_any());
        assert_eq!(updated.metadata.generation, Some(2));
        assert_eq!(updated.referenced_bundle_names(), vec!["cb-1", "cb-2"]);
        assert_eq!(updated.spec.requestor_hash, Some(ByteString(vec![1])));
        assert_eq!(updated.annotations()["example.io/note"], "x");
        assert!(target.owns(&updated));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_same_content_keeps_generation() {
        let (_, manager) = manager();
        let target = target("Helm");
        let options = GroupOptions::default();

        manager
            .reconcile_group(&target, vec![item("cb-1")], Action::Deploy, &options)
            .await
            .unwrap();
        let again = manager
            .reconcile_group(&target, vec![item("cb-1")], Action::Deploy, &options)
            .await
            .unwrap();
        assert_eq!(again.metadata.generation, Some(1));
    }

    #[tokio::test]
    async fn test_phase_transitions() {
        let (_, manager) = manager();
        let target = target("Helm");

        // 不存在时不创建
        assert!(manager.mark_group_as_preparing(&target).await.unwrap().is_none());
        assert!(manager.find_group(&target).await.unwrap().is_none());

        manager
            .reconcile_group(&target, vec![item("cb-1")], Action::Deploy, &GroupOptions::default())
            .await
            .unwrap();

        let preparing = manager.mark_group_as_preparing(&target).await.unwrap().unwrap();
        assert_eq!(preparing.spec.update_phase, UpdatePhase::Preparing);
        assert_eq!(preparing.referenced_bundle_names(), vec!["cb-1"]);

        // 已是 Preparing 时不再写入
        let unchanged = manager.mark_group_as_preparing(&target).await.unwrap().unwrap();
        assert_eq!(unchanged.metadata.resource_version, preparing.metadata.resource_version);

        let ready = manager.mark_group_as_ready(&target).await.unwrap().unwrap();
        assert_eq!(ready.spec.update_phase, UpdatePhase::Ready);
        assert_eq!(ready.spec.action, Action::Deploy);
        assert_eq!(ready.referenced_bundle_names(), vec!["cb-1"]);
    }

    #[tokio::test]
    async fn test_mark_for_removal() {
        let (_, manager) = manager();
        let target = target("Resources");

        // 不存在时创建
        let created = manager
            .mark_group_for_removal(&target, &GroupOptions::default())
            .await
            .unwrap();
        assert_eq!(created.spec.action, Action::Remove);
        assert!(created.spec.configuration_items.is_empty());

        manager
            .reconcile_group(&target, vec![item("cb-1")], Action::Deploy, &GroupOptions::default())
            .await
            .unwrap();
        let removing = manager
            .mark_group_for_removal(&target, &GroupOptions::default())
            .await
            .unwrap();
        assert_eq!(removing.name_any(), created.name_any());
        assert_eq!(removing.spec.action, Action::Remove);
        assert_eq!(removing.spec.update_phase, UpdatePhase::Ready);
        assert!(manager.get_referenced_bundles(&target).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_and_get() {
        let (store, manager) = manager();
        let target = target("Helm");

        assert!(manager.get_group(&target).await.unwrap_err().is_not_found());
        assert!(manager.delete_group(&target).await.is_ok());

        manager
            .reconcile_group(&target, vec![item("cb-1")], Action::Deploy, &GroupOptions::default())
            .await
            .unwrap();
        assert_eq!(manager.get_referenced_bundles(&target).await.unwrap(), vec!["cb-1"]);

        manager.delete_group(&target).await.unwrap();
        assert!(store.is_empty().await);
        assert!(manager.get_referenced_bundles(&target).await.unwrap().is_empty());
    }

    #[test_log::test(tokio::test)]
    async fn test_duplicate_groups_are_removed() {
        let (store, manager) = manager();
        let target = target("Helm");

        for name in ["cg-one", "cg-two"] {
            let mut group = ConfigurationGroup::new(name, ConfigurationGroupSpec::default());
            group.metadata.namespace = Some(target.cluster_namespace.clone());
            group.metadata.labels = Some(target.labels());
            group.metadata.annotations = Some(target.annotations());
            store.create(&group).await.unwrap();
        }

        let err = manager.get_group(&target).await.unwrap_err();
        assert!(matches!(err, Error::Duplicate { count: 2, .. }));
        assert!(store.is_empty().await);

        // 重试后收敛到唯一对象
        manager
            .reconcile_group(&target, Vec::new(), Action::Deploy, &GroupOptions::default())
            .await
            .unwrap();
        assert_eq!(store.len().await, 1);
    }
}
