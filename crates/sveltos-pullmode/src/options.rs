//! 部署选项
//!
//! [`GroupOptions`] 描述写入 ConfigurationGroup 的策略参数，
//! [`BundleOptions`] 描述写入 ConfigurationBundle 的来源信息。
//! 两者都通过 `with_*` 方法构建，未设置的字段保持默认值。

use k8s_openapi::api::core::v1::ObjectReference;
use k8s_openapi::ByteString;
use std::collections::BTreeMap;

use sveltos_common::{
    ConfigurationBundleSpec, ConfigurationGroupSpec, DriftExclusion, FeatureStatus, ValidateHealth,
};

/// 默认部署层级
const DEFAULT_TIER: i32 = 100;

/// ConfigurationGroup 策略参数
#[derive(Debug, Clone, PartialEq)]
pub struct GroupOptions {
    /// 上游对象状态哈希
    pub requestor_hash: Option<Vec<u8>>,
    /// 部署层级
    pub tier: i32,
    pub dry_run: bool,
    pub reloader: bool,
    pub drift_detection: bool,
    pub drift_exclusions: Vec<DriftExclusion>,
    pub continue_on_conflict: bool,
    pub continue_on_error: bool,
    pub max_consecutive_failures: Option<u32>,
    pub leave_policies: bool,
    pub validate_healths: Vec<ValidateHealth>,
    pub deployed_group_version_kind: Vec<String>,
    pub source_ref: Option<ObjectReference>,
    pub source_status: Option<FeatureStatus>,
    pub service_account_name: Option<String>,
    pub service_account_namespace: Option<String>,
    /// 合并到 ConfigurationGroup 上的额外注解
    pub annotations: BTreeMap<String, String>,
}

impl Default for GroupOptions {
    fn default() -> Self {
        Self {
            requestor_hash: None,
            tier: DEFAULT_TIER,
            dry_run: false,
            reloader: false,
            drift_detection: false,
            drift_exclusions: Vec::new(),
            continue_on_conflict: false,
            continue_on_error: false,
            max_consecutive_failures: None,
            leave_policies: false,
            validate_healths: Vec::new(),
            deployed_group_version_kind: Vec::new(),
            source_ref: None,
            source_status: None,
            service_account_name: None,
            service_account_namespace: None,
            annotations: BTreeMap::new(),
        }
    }
}

impl GroupOptions {
    /// 创建默认参数
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置上游对象状态哈希
    pub fn with_requestor_hash(mut self, hash: &[u8]) -> Self {
        self.requestor_hash = Some(hash.to_vec());
        self
    }

    /// 设置部署层级
    pub fn with_tier(mut self, tier: i32) -> Self {
        self.tier = tier;
        self
    }

    /// 只模拟部署
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_reloader(mut self, reloader: bool) -> Self {
        self.reloader = reloader;
        self
    }

    /// 开启配置漂移检测
    pub fn with_drift_detection(mut self, drift_detection: bool) -> Self {
        self.drift_detection = drift_detection;
        self
    }

    /// 添加漂移检测排除项
    pub fn with_drift_exclusion(mut self, exclusion: DriftExclusion) -> Self {
        self.drift_exclusions.push(exclusion);
        self
    }

    pub fn with_continue_on_conflict(mut self, continue_on_conflict: bool) -> Self {
        self.continue_on_conflict = continue_on_conflict;
        self
    }

    pub fn with_continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = continue_on_error;
        self
    }

    /// 设置连续失败上限
    pub fn with_max_consecutive_failures(mut self, max: u32) -> Self {
        self.max_consecutive_failures = Some(max);
        self
    }

    /// 移除时保留已部署的资源
    pub fn with_leave_policies(mut self, leave_policies: bool) -> Self {
        self.leave_policies = leave_policies;
        self
    }

    /// 添加健康检查
    pub fn with_validate_health(mut self, check: ValidateHealth) -> Self {
        self.validate_healths.push(check);
        self
    }

    /// 添加部署的资源类型
    pub fn with_deployed_group_version_kind(mut self, gvk: &str) -> Self {
        self.deployed_group_version_kind.push(gvk.to_string());
        self
    }

    /// 设置资源来源对象
    pub fn with_source_ref(mut self, source_ref: ObjectReference) -> Self {
        self.source_ref = Some(source_ref);
        self
    }

    pub fn with_source_status(mut self, status: FeatureStatus) -> Self {
        self.source_status = Some(status);
        self
    }

    /// 设置代理部署时模拟的 ServiceAccount
    pub fn with_service_account(mut self, namespace: &str, name: &str) -> Self {
        self.service_account_namespace = Some(namespace.to_string());
        self.service_account_name = Some(name.to_string());
        self
    }

    /// 添加注解
    pub fn with_annotation(mut self, key: &str, value: &str) -> Self {
        self.annotations.insert(key.to_string(), value.to_string());
        self
    }

    /// 将参数写入 ConfigurationGroup 规范
    ///
    /// 只覆盖策略字段，动作、更新阶段和配置项由调用方设置。
    pub fn apply(&self, spec: &mut ConfigurationGroupSpec) {
        spec.requestor_hash = self.requestor_hash.clone().map(ByteString);
        spec.tier = self.tier;
        spec.dry_run = self.dry_run;
        spec.reloader = self.reloader;
        spec.drift_detection = self.drift_detection;
        spec.drift_exclusions = self.drift_exclusions.clone();
        spec.continue_on_conflict = self.continue_on_conflict;
        spec.continue_on_error = self.continue_on_error;
        spec.max_consecutive_failures = self.max_consecutive_failures;
        spec.leave_policies = self.leave_policies;
        spec.validate_healths = self.validate_healths.clone();
        spec.deployed_group_version_kind = self.deployed_group_version_kind.clone();
        spec.source_ref = self.source_ref.clone();
        spec.source_status = self.source_status;
        spec.service_account_name = self.service_account_name.clone();
        spec.service_account_namespace = self.service_account_namespace.clone();
    }
}

/// ConfigurationBundle 来源信息，仅用于展示
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BundleOptions {
    /// 部署超时时间（如 "5m"）
    pub timeout: Option<String>,
    pub helm_release_namespace: Option<String>,
    pub helm_release_name: Option<String>,
    pub helm_chart_version: Option<String>,
    pub helm_repo_url: Option<String>,
    pub helm_chart_name: Option<String>,
    pub referenced_object_kind: Option<String>,
    pub referenced_object_namespace: Option<String>,
    pub referenced_object_name: Option<String>,
    pub reference_tier: Option<i32>,
}

impl BundleOptions {
    /// 创建空的来源信息
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置部署超时时间
    pub fn with_timeout(mut self, timeout: &str) -> Self {
        self.timeout = Some(timeout.to_string());
        self
    }

    /// 设置 Helm release
    pub fn with_helm_release(mut self, namespace: &str, name: &str) -> Self {
        self.helm_release_namespace = Some(namespace.to_string());
        self.helm_release_name = Some(name.to_string());
        self
    }

    /// 设置 Helm chart 信息
    pub fn with_helm_chart(mut self, repo_url: &str, chart_name: &str, chart_version: &str) -> Self {
        self.helm_repo_url = Some(repo_url.to_string());
        self.helm_chart_name = Some(chart_name.to_string());
        self.helm_chart_version = Some(chart_version.to_string());
        self
    }

    /// 设置资源来源对象
    pub fn with_referenced_object(mut self, kind: &str, namespace: &str, name: &str) -> Self {
        self.referenced_object_kind = Some(kind.to_string());
        self.referenced_object_namespace = Some(namespace.to_string());
        self.referenced_object_name = Some(name.to_string());
        self
    }

    pub fn with_reference_tier(mut self, tier: i32) -> Self {
        self.reference_tier = Some(tier);
        self
    }

    /// 将来源信息写入 ConfigurationBundle 规范
    pub fn apply(&self, spec: &mut ConfigurationBundleSpec) {
        spec.timeout = self.timeout.clone();
        spec.helm_release_namespace = self.helm_release_namespace.clone();
        spec.helm_release_name = self.helm_release_name.clone();
        spec.helm_chart_version = self.helm_chart_version.clone();
        spec.helm_repo_url = self.helm_repo_url.clone();
        spec.helm_chart_name = self.helm_chart_name.clone();
        spec.referenced_object_kind = self.referenced_object_kind.clone();
        spec.referenced_object_namespace = self.referenced_object_namespace.clone();
        spec.referenced_object_name = self.referenced_object_name.clone();
        spec.reference_tier = self.reference_tier;
    }
}
