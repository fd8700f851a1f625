//! 单元测试共用的构造函数

use kube::api::DynamicObject;
use serde_json::json;

use crate::target::DeploymentTarget;

/// 测试用部署目标
pub fn target(feature: &str) -> DeploymentTarget {
    DeploymentTarget::new("capi", "cluster-1", "ClusterSummary", "summary-a", feature)
}

/// 构造一个 ConfigMap 资源
pub fn config_map(name: &str, value: &str) -> DynamicObject {
    serde_json::from_value(json!({
        "apiVersion": "v1",
        "kind": "ConfigMap",
        "metadata": {"name": name, "namespace": "default"},
        "data": {"value": value},
    }))
    .unwrap()
}

/// 构造一个 Namespace 资源，带有 API 服务器字段
pub fn namespace(name: &str) -> DynamicObject {
    serde_json::from_value(json!({
        "apiVersion": "v1",
        "kind": "Namespace",
        "metadata": {
            "name": name,
            "resourceVersion": "1001",
            "uid": "7d2b1f1e-0000-4000-8000-000000000001",
        },
    }))
    .unwrap()
}
