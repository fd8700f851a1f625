//! 共享类型模型
//!
//! 该模块定义了 ConfigurationGroup 与 ConfigurationBundle 共用的类型，
//! 包括功能部署状态、漂移排除规则和健康检查定义。

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// 功能部署状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum FeatureStatus {
    /// 正在部署
    Provisioning,
    /// 部署完成
    Provisioned,
    /// 部署失败
    Failed,
    /// 正在移除
    Removing,
    /// 移除完成
    Removed,
}

impl fmt::Display for FeatureStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureStatus::Provisioning => write!(f, "Provisioning"),
            FeatureStatus::Provisioned => write!(f, "Provisioned"),
            FeatureStatus::Failed => write!(f, "Failed"),
            FeatureStatus::Removing => write!(f, "Removing"),
            FeatureStatus::Removed => write!(f, "Removed"),
        }
    }
}

impl FromStr for FeatureStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Provisioning" => Ok(FeatureStatus::Provisioning),
            "Provisioned" => Ok(FeatureStatus::Provisioned),
            "Failed" => Ok(FeatureStatus::Failed),
            "Removing" => Ok(FeatureStatus::Removing),
            "Removed" => Ok(FeatureStatus::Removed),
            _ => Err(Error::InvalidResource(format!("无效的功能状态: {}", s))),
        }
    }
}

/// 补丁目标选择器
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PatchSelector {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_selector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotation_selector: Option<String>,
}

/// 漂移检测排除规则
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DriftExclusion {
    /// 忽略的字段路径（JSON pointer）
    pub paths: Vec<String>,

    /// 规则适用的资源，为空表示适用于所有资源
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<PatchSelector>,
}

/// 标签过滤操作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum LabelFilterOperation {
    /// 等于
    Equal,
    /// 不等于
    Different,
}

/// 标签过滤条件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LabelFilter {
    pub key: String,
    pub operation: LabelFilterOperation,
    pub value: String,
}

/// 部署后的健康检查
///
/// 由代理在应用资源后执行，脚本部分交给代理内嵌的解释器求值。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ValidateHealth {
    /// 健康检查名称
    pub name: String,

    /// 触发检查的功能（Resources、Helm、Kustomize）
    #[serde(rename = "featureID")]
    pub feature_id: String,

    #[serde(default)]
    pub group: String,
    pub version: String,
    pub kind: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub label_filters: Vec<LabelFilter>,

    /// 评估脚本
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(FeatureStatus::Provisioning)]
    #[case(FeatureStatus::Provisioned)]
    #[case(FeatureStatus::Failed)]
    #[case(FeatureStatus::Removing)]
    #[case(FeatureStatus::Removed)]
    fn test_feature_status_text(#[case] status: FeatureStatus) {
        let text = status.to_string();
        assert_eq!(text.parse::<FeatureStatus>().unwrap(), status);
        assert_eq!(serde_json::to_string(&status).unwrap(), format!("\"{}\"", text));
    }

    #[test]
    fn test_invalid_feature_status() {
        assert!("provisioned".parse::<FeatureStatus>().is_err());
        assert!("".parse::<FeatureStatus>().is_err());
    }

    #[test]
    fn test_validate_health_wire_names() {
        let health = ValidateHealth {
            name: "deployment-ready".to_string(),
            feature_id: "Helm".to_string(),
            group: "apps".to_string(),
            version: "v1".to_string(),
            kind: "Deployment".to_string(),
            ..Default::default()
        };
        let value = serde_json::to_value(&health).unwrap();
        assert_eq!(value["featureID"], "Helm");
        assert!(value.get("labelFilters").is_none());
        assert!(value.get("script").is_none());
    }
}
