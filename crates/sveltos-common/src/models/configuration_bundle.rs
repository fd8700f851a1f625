//! ConfigurationBundle 自定义资源
//!
//! 一个 ConfigurationBundle 保存一组序列化后的 Kubernetes 资源清单及其内容哈希，
//! 归属于某个（集群，请求方，功能，索引）组合，由拉取代理按名称获取。

use k8s_openapi::ByteString;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// ConfigurationBundle 规范
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[kube(
    group = "lib.projectsveltos.io",
    version = "v1beta1",
    kind = "ConfigurationBundle",
    plural = "configurationbundles",
    namespaced
)]
#[kube(status = "ConfigurationBundleStatus")]
#[serde(rename_all = "camelCase")]
pub struct ConfigurationBundleSpec {
    /// 按顺序排列的资源清单（YAML）
    #[serde(default)]
    pub resources: Vec<String>,

    /// 为 true 时资源不参与冲突跟踪，删除时也不会自动移除
    /// （例如 Sveltos 自身的代理和 CRD）
    #[serde(default)]
    pub not_tracked: bool,

    /// 部署超时时间（如 "5m"）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub helm_release_namespace: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub helm_release_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub helm_chart_version: Option<String>,

    #[serde(default, rename = "helmRepoURL", skip_serializing_if = "Option::is_none")]
    pub helm_repo_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub helm_chart_name: Option<String>,

    /// 资源来源对象（ConfigMap/Secret 等）的类型
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referenced_object_kind: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referenced_object_namespace: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referenced_object_name: Option<String>,

    /// 来源对象的部署层级
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_tier: Option<i32>,
}

/// ConfigurationBundle 状态
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurationBundleStatus {
    /// 最近一次写入时 `spec.resources` 的 sha256 哈希
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<String>")]
    pub hash: Option<ByteString>,
}

impl ConfigurationBundle {
    /// 状态中记录的内容哈希
    pub fn hash(&self) -> Option<&[u8]> {
        self.status
            .as_ref()
            .and_then(|status| status.hash.as_ref())
            .map(|hash| hash.0.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::Resource;

    #[test]
    fn test_bundle_api_identity() {
        assert_eq!(ConfigurationBundle::group(&()), "lib.projectsveltos.io");
        assert_eq!(ConfigurationBundle::version(&()), "v1beta1");
        assert_eq!(ConfigurationBundle::kind(&()), "ConfigurationBundle");
        assert_eq!(ConfigurationBundle::plural(&()), "configurationbundles");
    }

    #[test]
    fn test_bundle_wire_format() {
        let mut bundle = ConfigurationBundle::new(
            "cb-abc",
            ConfigurationBundleSpec {
                resources: vec!["kind: Namespace".to_string()],
                not_tracked: true,
                helm_repo_url: Some("https://charts.example.com".to_string()),
                ..Default::default()
            },
        );
        bundle.status = Some(ConfigurationBundleStatus {
            hash: Some(ByteString(vec![1, 2, 3])),
        });

        let value = serde_json::to_value(&bundle).unwrap();
        assert_eq!(value["spec"]["notTracked"], true);
        assert_eq!(value["spec"]["helmRepoURL"], "https://charts.example.com");
        assert!(value["spec"].get("timeout").is_none());
        // []byte 在线上以 base64 编码
        assert_eq!(value["status"]["hash"], "AQID");

        let decoded: ConfigurationBundle = serde_json::from_value(value).unwrap();
        assert_eq!(decoded.hash(), Some(&[1u8, 2, 3][..]));
    }

    #[test]
    fn test_crd_schema_hash_is_string() {
        use kube::CustomResourceExt;

        let crd = ConfigurationBundle::crd();
        let schema = serde_json::to_value(&crd.spec.versions[0].schema).unwrap();
        let status = &schema["openAPIV3Schema"]["properties"]["status"]["properties"];
        assert_eq!(status["hash"]["type"], "string");
    }
}
