//! ConfigurationGroup 自定义资源
//!
//! 每个（集群，请求方类型，请求方名称，请求方功能）组合对应唯一的 ConfigurationGroup。
//! 它列出当前有效的 ConfigurationBundle，携带部署/移除意图，
//! 并由拉取代理回写确认状态。

use k8s_openapi::api::core::v1::ObjectReference;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use k8s_openapi::ByteString;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::shared::{DriftExclusion, FeatureStatus, ValidateHealth};

/// 交给代理的动作
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum Action {
    /// 部署引用的资源
    #[default]
    Deploy,
    /// 移除之前部署的资源
    Remove,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Deploy => write!(f, "Deploy"),
            Action::Remove => write!(f, "Remove"),
        }
    }
}

/// 更新阶段
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum UpdatePhase {
    /// 内容已提交，代理可以处理
    #[default]
    Ready,
    /// 仍在组装中，代理不应处理
    Preparing,
}

impl fmt::Display for UpdatePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdatePhase::Ready => write!(f, "Ready"),
            UpdatePhase::Preparing => write!(f, "Preparing"),
        }
    }
}

/// 对 ConfigurationBundle 的引用及其内容哈希
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurationItem {
    /// 引用的 ConfigurationBundle
    pub content_ref: ObjectReference,

    /// 引用时 ConfigurationBundle 的内容哈希
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<String>")]
    pub hash: Option<ByteString>,
}

/// ConfigurationGroup 规范
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
#[kube(
    group = "lib.projectsveltos.io",
    version = "v1beta1",
    kind = "ConfigurationGroup",
    plural = "configurationgroups",
    namespaced
)]
#[kube(status = "ConfigurationGroupStatus")]
#[kube(printcolumn = r#"{"name":"Action","type":"string","jsonPath":".spec.action"}"#)]
#[kube(printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".spec.updatePhase"}"#)]
#[kube(printcolumn = r#"{"name":"Status","type":"string","jsonPath":".status.deploymentStatus"}"#)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurationGroupSpec {
    /// 交给代理的动作
    #[serde(default)]
    pub action: Action,

    /// 当前有效的 ConfigurationBundle 列表，按部署顺序排列
    #[serde(default)]
    pub configuration_items: Vec<ConfigurationItem>,

    /// 为 Preparing 时代理应等待
    #[serde(default)]
    pub update_phase: UpdatePhase,

    /// 触发本次部署的上游对象状态哈希
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<String>")]
    pub requestor_hash: Option<ByteString>,

    /// 部署层级，数字越小优先级越高
    #[serde(default = "default_tier")]
    pub tier: i32,

    #[serde(default)]
    pub dry_run: bool,

    /// 配置变化时滚动重启工作负载
    #[serde(default)]
    pub reloader: bool,

    #[serde(default)]
    pub drift_detection: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub drift_exclusions: Vec<DriftExclusion>,

    #[serde(default)]
    pub continue_on_conflict: bool,

    #[serde(default)]
    pub continue_on_error: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_consecutive_failures: Option<u32>,

    /// 移除时保留已部署的资源
    #[serde(default)]
    pub leave_policies: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub validate_healths: Vec<ValidateHealth>,

    /// 部署的资源类型（group/version/kind）
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deployed_group_version_kind: Vec<String>,

    /// 资源来源对象
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_ref: Option<ObjectReference>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_status: Option<FeatureStatus>,

    /// 代理部署时模拟的 ServiceAccount
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account_namespace: Option<String>,
}

/// ConfigurationGroup 状态，由拉取代理写入
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurationGroupStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_status: Option<FeatureStatus>,

    /// 代理处理过的最新 generation
    #[serde(default)]
    pub observed_generation: i64,

    /// 代理处理过的 requestor hash
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<String>")]
    pub observed_requestor_hash: Option<ByteString>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_applied_time: Option<Time>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_message: Option<String>,
}

/// 默认部署层级
fn default_tier() -> i32 {
    100
}

impl Default for ConfigurationGroupSpec {
    fn default() -> Self {
        Self {
            action: Action::default(),
            configuration_items: Vec::new(),
            update_phase: UpdatePhase::default(),
            requestor_hash: None,
            tier: default_tier(),
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
        }
    }
}

impl ConfigurationGroup {
    /// 引用的 ConfigurationBundle 名称，按顺序排列
    pub fn referenced_bundle_names(&self) -> Vec<String> {
        self.spec
            .configuration_items
            .iter()
            .filter_map(|item| item.content_ref.name.clone())
            .collect()
    }

    /// 代理是否已处理当前 generation
    pub fn is_generation_observed(&self) -> bool {
        match (&self.status, self.metadata.generation) {
            (Some(status), Some(generation)) => status.observed_generation == generation,
            _ => false,
        }
    }

    /// 代理是否已处理当前 requestor hash
    pub fn is_requestor_hash_observed(&self) -> bool {
        match &self.status {
            Some(status) => status.observed_requestor_hash == self.spec.requestor_hash,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group_with_status(generation: i64, status: Option<ConfigurationGroupStatus>) -> ConfigurationGroup {
        let mut group = ConfigurationGroup::new("cg-test", ConfigurationGroupSpec::default());
        group.metadata.generation = Some(generation);
        group.status = status;
        group
    }

    #[test]
    fn test_spec_defaults_from_empty_object() {
        let spec: ConfigurationGroupSpec = serde_json::from_str("{}").unwrap();
        assert_eq!(spec.action, Action::Deploy);
        assert_eq!(spec.update_phase, UpdatePhase::Ready);
        assert_eq!(spec.tier, 100);
        assert!(spec.configuration_items.is_empty());
        assert_eq!(spec, ConfigurationGroupSpec::default());
    }

    #[test]
    fn test_spec_wire_format() {
        let spec = ConfigurationGroupSpec {
            action: Action::Remove,
            update_phase: UpdatePhase::Preparing,
            requestor_hash: Some(ByteString(b"abc".to_vec())),
            configuration_items: vec![ConfigurationItem {
                content_ref: ObjectReference {
                    name: Some("cb-1".to_string()),
                    ..Default::default()
                },
                hash: None,
            }],
            ..Default::default()
        };
        let value = serde_json::to_value(&spec).unwrap();
        assert_eq!(value["action"], "Remove");
        assert_eq!(value["updatePhase"], "Preparing");
        assert_eq!(value["requestorHash"], "YWJj");
        assert_eq!(value["configurationItems"][0]["contentRef"]["name"], "cb-1");
    }

    #[test]
    fn test_observed_markers() {
        let hash = Some(ByteString(vec![9]));

        let mut group = group_with_status(
            2,
            Some(ConfigurationGroupStatus {
                observed_generation: 2,
                observed_requestor_hash: hash.clone(),
                ..Default::default()
            }),
        );
        group.spec.requestor_hash = hash;
        assert!(group.is_generation_observed());
        assert!(group.is_requestor_hash_observed());

        group.metadata.generation = Some(3);
        assert!(!group.is_generation_observed());

        group.spec.requestor_hash = Some(ByteString(vec![10]));
        assert!(!group.is_requestor_hash_observed());

        let fresh = group_with_status(1, None);
        assert!(!fresh.is_generation_observed());
        assert!(!fresh.is_requestor_hash_observed());
    }

    #[test]
    fn test_referenced_bundle_names_keep_order() {
        let mut group = group_with_status(1, None);
        for name in ["cb-b", "cb-a"] {
            group.spec.configuration_items.push(ConfigurationItem {
                content_ref: ObjectReference {
                    name: Some(name.to_string()),
                    ..Default::default()
                },
                hash: None,
            });
        }
        assert_eq!(group.referenced_bundle_names(), vec!["cb-b", "cb-a"]);
    }

    #[test]
    fn test_crd_schema_hashes_are_strings() {
        use kube::CustomResourceExt;

        let crd = ConfigurationGroup::crd();
        let schema = serde_json::to_value(&crd.spec.versions[0].schema).unwrap();
        let properties = &schema["openAPIV3Schema"]["properties"];
        let spec = &properties["spec"]["properties"];
        assert_eq!(spec["requestorHash"]["type"], "string");
        assert_eq!(spec["configurationItems"]["items"]["properties"]["hash"]["type"], "string");
        assert_eq!(
            properties["status"]["properties"]["observedRequestorHash"]["type"],
            "string"
        );
    }
}
