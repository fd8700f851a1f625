//! 拉取模式公共接口
//!
//! [`PullModeClient`] 负责发布供拉取代理获取的资源。每个部署目标的
//! ConfigurationGroup 处于以下状态之一：
//!
//! - 不存在：从未记录过，或已终止跟踪；
//! - Preparing：正在暂存新内容，代理暂不处理；
//! - Ready + Deploy：代理部署引用的 ConfigurationBundle；
//! - Ready + Remove：代理移除之前部署的资源。
//!
//! 写入顺序固定为：先写 ConfigurationBundle，再写引用它们的 ConfigurationGroup，
//! 最后删除不再被引用的 ConfigurationBundle。

use kube::api::DynamicObject;
use kube::{Client, ResourceExt};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

use sveltos_common::{
    Action, ConfigurationBundle, ConfigurationGroup, ConfigurationGroupStatus, Error,
    FeatureStatus, ProcessingMismatchError, PullModeSettings, Result, UpdatePhase,
};

use crate::bundle::{configuration_item, BundleManager};
use crate::group::GroupManager;
use crate::labels;
use crate::options::{BundleOptions, GroupOptions};
use crate::staging::StagingRegistry;
use crate::store::{KubeStore, ObjectStore};
use crate::target::DeploymentTarget;

/// 拉取模式客户端
pub struct PullModeClient {
    /// ConfigurationBundle 存储
    bundle_store: Arc<dyn ObjectStore<ConfigurationBundle>>,
    /// ConfigurationGroup 存储
    group_store: Arc<dyn ObjectStore<ConfigurationGroup>>,
    bundles: BundleManager,
    groups: GroupManager,
    /// 暂存注册表
    staging: Arc<StagingRegistry>,
    /// 运行参数
    settings: PullModeSettings,
}

impl PullModeClient {
    /// 基于给定的对象存储创建客户端
    pub fn new(
        bundle_store: Arc<dyn ObjectStore<ConfigurationBundle>>,
        group_store: Arc<dyn ObjectStore<ConfigurationGroup>>,
    ) -> Self {
        let settings = PullModeSettings::default();
        Self {
            bundles: BundleManager::new(bundle_store.clone(), settings.clone()),
            groups: GroupManager::new(group_store.clone(), settings.clone()),
            bundle_store,
            group_store,
            staging: Arc::new(StagingRegistry::new()),
            settings,
        }
    }

    /// 基于 Kubernetes 客户端创建客户端
    pub fn from_client(client: Client) -> Self {
        let store = Arc::new(KubeStore::new(client));
        Self::new(store.clone(), store)
    }

    /// 设置运行参数
    pub fn with_settings(mut self, settings: PullModeSettings) -> Self {
        self.bundles = BundleManager::new(self.bundle_store.clone(), settings.clone());
        self.groups = GroupManager::new(self.group_store.clone(), settings.clone());
        self.settings = settings;
        self
    }

    /// 使用共享的暂存注册表
    pub fn with_staging(mut self, staging: Arc<StagingRegistry>) -> Self {
        self.staging = staging;
        self
    }

    /// 暂存注册表
    pub fn staging(&self) -> Arc<StagingRegistry> {
        self.staging.clone()
    }

    /// 当前运行参数
    pub fn settings(&self) -> &PullModeSettings {
        &self.settings
    }

    /// 立即发布资源
    ///
    /// 每个索引写入一个 ConfigurationBundle，ConfigurationGroup 按索引顺序引用它们，
    /// 之后删除不再被引用的 ConfigurationBundle。进行中的暂存内容被丢弃。
    /// `not_tracked` 与 `bundle_options` 作用于本次写入的每个 ConfigurationBundle。
    pub async fn record_resources_for_deployment(
        &self,
        target: &DeploymentTarget,
        resources: &BTreeMap<String, Vec<DynamicObject>>,
        not_tracked: bool,
        bundle_options: &BundleOptions,
        options: &GroupOptions,
    ) -> Result<()> {
        target.validate()?;

        let mut items = Vec::with_capacity(resources.len());
        for (index, objects) in resources {
            let bundle = self
                .bundles
                .reconcile_bundle(target, index, objects, not_tracked, false, bundle_options)
                .await?;
            items.push(configuration_item(&bundle));
        }

        let group = self
            .groups
            .reconcile_group(target, items, Action::Deploy, options)
            .await?;
        self.prune_unreferenced(target, &group).await?;
        self.clear_own_staging(target).await;

        info!(
            "记录 {} 的部署内容: {} 个 ConfigurationBundle",
            target,
            resources.len()
        );
        Ok(())
    }

    /// 暂存资源，等待提交
    ///
    /// ConfigurationGroup（如果存在）进入 Preparing 阶段，代理继续使用之前的内容。
    /// 可以多次调用，逐步暂存不同索引的资源。
    pub async fn stage_resources_for_deployment(
        &self,
        target: &DeploymentTarget,
        resources: &BTreeMap<String, Vec<DynamicObject>>,
        not_tracked: bool,
        options: &BundleOptions,
    ) -> Result<()> {
        target.validate()?;

        self.groups.mark_group_as_preparing(target).await?;

        let key = target.staging_key();
        for (index, objects) in resources {
            let bundle = self
                .bundles
                .reconcile_bundle(target, index, objects, not_tracked, true, options)
                .await?;
            debug!("暂存 {} 索引 {} -> {}", target, index, bundle.name_any());
            self.staging.store_bundle(&key, bundle).await;
        }
        Ok(())
    }

    /// 提交暂存的资源
    ///
    /// ConfigurationGroup 改为恰好引用暂存的 ConfigurationBundle 并进入 Ready 阶段，
    /// 删除其余 ConfigurationBundle，再去掉暂存标签并清空暂存内容。
    pub async fn commit_staged_resources_for_deployment(
        &self,
        target: &DeploymentTarget,
        options: &GroupOptions,
    ) -> Result<()> {
        target.validate()?;

        let key = target.staging_key();
        let staged = self.staging.get_bundles(&key).await;
        if staged.is_empty() {
            debug!("{} 没有暂存内容，提交空配置", target);
        }

        let items = staged.iter().map(configuration_item).collect();
        let group = self
            .groups
            .reconcile_group(target, items, Action::Deploy, options)
            .await?;
        self.prune_unreferenced(target, &group).await?;

        for bundle in &staged {
            self.bundles
                .clear_staged_marker(&target.cluster_namespace, &bundle.name_any())
                .await?;
        }
        self.staging.clear_bundles(&key).await;

        info!("提交 {} 的暂存内容: {} 个 ConfigurationBundle", target, staged.len());
        Ok(())
    }

    /// 丢弃暂存的资源
    ///
    /// ConfigurationGroup 恢复到暂存前的 Ready 状态，
    /// 删除其未引用的 ConfigurationBundle（没有 ConfigurationGroup 时全部删除）。
    pub async fn discard_staged_resources_for_deployment(
        &self,
        target: &DeploymentTarget,
    ) -> Result<()> {
        self.staging.clear_bundles(&target.staging_key()).await;

        let referenced: HashSet<String> = match self.groups.mark_group_as_ready(target).await? {
            Some(group) => group.referenced_bundle_names().into_iter().collect(),
            None => HashSet::new(),
        };
        let deleted = self.bundles.delete_stale_bundles(target, &referenced).await?;

        info!("丢弃 {} 的暂存内容，删除 {} 个 ConfigurationBundle", target, deleted);
        Ok(())
    }

    /// 让代理移除之前部署的资源
    ///
    /// ConfigurationGroup 不存在时也会创建，确保代理收到移除请求。
    pub async fn remove_deployed_resources(
        &self,
        target: &DeploymentTarget,
        options: &GroupOptions,
    ) -> Result<()> {
        target.validate()?;

        self.clear_own_staging(target).await;
        self.groups.mark_group_for_removal(target, options).await?;
        self.bundles.delete_all_bundles(target).await?;

        info!("请求移除 {} 部署的资源", target);
        Ok(())
    }

    /// 停止跟踪部署目标，删除全部 ConfigurationBundle 和 ConfigurationGroup
    pub async fn terminate_deployment_tracking(&self, target: &DeploymentTarget) -> Result<()> {
        self.clear_own_staging(target).await;
        self.bundles.delete_all_bundles(target).await?;
        self.groups.delete_group(target).await?;

        info!("停止跟踪 {}", target);
        Ok(())
    }

    /// 部署状态
    ///
    /// 只有当 ConfigurationGroup 处于 Ready + Deploy，且代理已处理当前 generation
    /// 和 requestor hash 时才返回状态，否则返回 [`Error::ProcessingMismatch`]。
    pub async fn get_deployment_status(
        &self,
        target: &DeploymentTarget,
    ) -> Result<ConfigurationGroupStatus> {
        let group = self.groups.get_group(target).await?;
        ensure_phase(&group, Action::Deploy)?;

        if !group.is_generation_observed() {
            return Err(mismatch(&group, "代理尚未处理最新的 generation"));
        }
        if !group.is_requestor_hash_observed() {
            return Err(mismatch(&group, "代理尚未处理最新的 requestor hash"));
        }

        group
            .status
            .clone()
            .ok_or_else(|| mismatch(&group, "代理尚未上报状态"))
    }

    /// 移除状态
    ///
    /// ConfigurationGroup 不存在时视为已移除。
    pub async fn get_remove_status(
        &self,
        target: &DeploymentTarget,
    ) -> Result<ConfigurationGroupStatus> {
        let group = match self.groups.find_group(target).await? {
            Some(group) => group,
            None => {
                return Ok(ConfigurationGroupStatus {
                    deployment_status: Some(FeatureStatus::Removed),
                    ..Default::default()
                })
            }
        };
        ensure_phase(&group, Action::Remove)?;

        if !group.is_generation_observed() {
            return Err(mismatch(&group, "代理尚未处理移除请求"));
        }

        group
            .status
            .clone()
            .ok_or_else(|| mismatch(&group, "代理尚未上报状态"))
    }

    /// 资源来源对象的状态
    pub async fn get_source_status(
        &self,
        target: &DeploymentTarget,
    ) -> Result<Option<FeatureStatus>> {
        let group = self.groups.get_group(target).await?;
        ensure_phase(&group, Action::Deploy)?;
        Ok(group.spec.source_status)
    }

    /// 最近一次部署使用的 requestor hash
    pub async fn get_requestor_hash(&self, target: &DeploymentTarget) -> Result<Option<Vec<u8>>> {
        let group = self.groups.get_group(target).await?;
        ensure_phase(&group, Action::Deploy)?;
        Ok(group.spec.requestor_hash.map(|hash| hash.0))
    }

    /// 代理是否正在部署
    ///
    /// 状态不一致或 ConfigurationGroup 不存在时返回 `false`。
    pub async fn is_being_provisioned(&self, target: &DeploymentTarget) -> Result<bool> {
        match self.get_deployment_status(target).await {
            Ok(status) => Ok(status.deployment_status == Some(FeatureStatus::Provisioning)),
            Err(e) if e.is_processing_mismatch() || e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// 代理是否正在移除或已经移除
    pub async fn is_being_removed(&self, target: &DeploymentTarget) -> Result<bool> {
        match self.get_remove_status(target).await {
            Ok(status) => Ok(matches!(
                status.deployment_status,
                Some(FeatureStatus::Removing) | Some(FeatureStatus::Removed)
            )),
            Err(e) if e.is_processing_mismatch() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// 已暂存但尚未提交的 ConfigurationBundle
    pub async fn get_staged_bundles(&self, target: &DeploymentTarget) -> Vec<ConfigurationBundle> {
        self.staging.get_bundles(&target.staging_key()).await
    }

    /// 当前 ConfigurationGroup 引用的 ConfigurationBundle 名称
    pub async fn get_referenced_bundles(&self, target: &DeploymentTarget) -> Result<Vec<String>> {
        self.groups.get_referenced_bundles(target).await
    }

    /// 丢弃本部署目标的暂存内容
    ///
    /// 暂存键不含请求方类型，快照带有其他类型标签时保留，避免误清同名请求方的暂存。
    async fn clear_own_staging(&self, target: &DeploymentTarget) {
        let kind = target.requestor_kind.as_str();
        self.staging
            .clear_bundles_if(&target.staging_key(), |bundle| {
                bundle.labels().get(labels::REQUESTOR_KIND_LABEL).map(String::as_str) == Some(kind)
            })
            .await;
    }

    /// 删除 ConfigurationGroup 未引用的 ConfigurationBundle
    async fn prune_unreferenced(
        &self,
        target: &DeploymentTarget,
        group: &ConfigurationGroup,
    ) -> Result<()> {
        let referenced: HashSet<String> = group.referenced_bundle_names().into_iter().collect();
        self.bundles.delete_stale_bundles(target, &referenced).await?;
        Ok(())
    }
}

/// 构造处理状态不一致错误，附带已有的状态
fn mismatch(group: &ConfigurationGroup, message: &str) -> Error {
    let error = ProcessingMismatchError::new(format!("ConfigurationGroup {}: {}", group.name_any(), message));
    match &group.status {
        Some(status) => error.with_stale_status(status.clone()).into(),
        None => error.into(),
    }
}

/// 检查 ConfigurationGroup 是否处于 Ready 阶段且动作符合预期
fn ensure_phase(group: &ConfigurationGroup, action: Action) -> Result<()> {
    if group.spec.action != action {
        return Err(mismatch(
            group,
            &format!("动作为 {}，期望 {}", group.spec.action, action),
        ));
    }
    if group.spec.update_phase != UpdatePhase::Ready {
        return Err(mismatch(
            group,
            &format!("更新阶段为 {}", group.spec.update_phase),
        ));
    }
    Ok(())
}
