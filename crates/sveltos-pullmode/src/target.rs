//! 部署目标
//!
//! 一个部署目标由受管集群和请求方共同确定，是 ConfigurationGroup
//! 与 ConfigurationBundle 的归属单位。

use kube::ResourceExt;
use std::collections::BTreeMap;
use std::fmt;

use sveltos_common::{Error, Result};

use crate::labels::{
    self, CLUSTER_NAME_LABEL, INDEX_ANNOTATION, REQUESTOR_FEATURE_LABEL, REQUESTOR_KIND_LABEL,
    REQUESTOR_NAME_ANNOTATION,
};
use crate::staging::StagingKey;

/// （集群，请求方）部署目标
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeploymentTarget {
    /// 受管集群在管理集群中的命名空间，对象都创建在这里
    pub cluster_namespace: String,
    /// 受管集群名称
    pub cluster_name: String,
    /// 请求方类型
    pub requestor_kind: String,
    /// 请求方名称
    pub requestor_name: String,
    /// 请求方功能
    pub requestor_feature: String,
}

impl DeploymentTarget {
    /// 创建新的部署目标
    pub fn new(
        cluster_namespace: &str,
        cluster_name: &str,
        requestor_kind: &str,
        requestor_name: &str,
        requestor_feature: &str,
    ) -> Self {
        Self {
            cluster_namespace: cluster_namespace.to_string(),
            cluster_name: cluster_name.to_string(),
            requestor_kind: requestor_kind.to_string(),
            requestor_name: requestor_name.to_string(),
            requestor_feature: requestor_feature.to_string(),
        }
    }

    /// 检查各字段能否写入标签
    pub fn validate(&self) -> Result<()> {
        if self.cluster_namespace.is_empty() {
            return Err(Error::InvalidResource("集群命名空间不能为空".to_string()));
        }
        if self.requestor_name.is_empty() {
            return Err(Error::InvalidResource("请求方名称不能为空".to_string()));
        }

        for (key, value) in self.labels() {
            if value.is_empty() || !labels::is_valid_label_value(&value) {
                return Err(Error::InvalidResource(format!(
                    "标签 {} 的取值无效: {:?}",
                    key, value
                )));
            }
        }

        Ok(())
    }

    /// ConfigurationGroup 与 ConfigurationBundle 共用的标签
    pub fn labels(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            (CLUSTER_NAME_LABEL.to_string(), self.cluster_name.clone()),
            (REQUESTOR_KIND_LABEL.to_string(), self.requestor_kind.clone()),
            (REQUESTOR_FEATURE_LABEL.to_string(), self.requestor_feature.clone()),
        ])
    }

    /// ConfigurationGroup 与 ConfigurationBundle 共用的注解
    pub fn annotations(&self) -> BTreeMap<String, String> {
        BTreeMap::from([(
            REQUESTOR_NAME_ANNOTATION.to_string(),
            self.requestor_name.clone(),
        )])
    }

    /// ConfigurationBundle 的注解，额外带上索引
    pub fn bundle_annotations(&self, index: &str) -> BTreeMap<String, String> {
        let mut annotations = self.annotations();
        annotations.insert(INDEX_ANNOTATION.to_string(), index.to_string());
        annotations
    }

    /// 对象是否属于该部署目标
    ///
    /// 标签部分已由列表查询过滤，这里只比较请求方名称注解。
    pub fn owns<K: ResourceExt>(&self, object: &K) -> bool {
        labels::annotation(object, REQUESTOR_NAME_ANNOTATION) == Some(self.requestor_name.as_str())
    }

    /// 暂存注册表中的键
    pub fn staging_key(&self) -> StagingKey {
        StagingKey {
            cluster_namespace: self.cluster_namespace.clone(),
            cluster_name: self.cluster_name.clone(),
            requestor_name: self.requestor_name.clone(),
            requestor_feature: self.requestor_feature.clone(),
        }
    }
}

impl fmt::Display for DeploymentTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} {}:{}/{}",
            self.cluster_namespace,
            self.cluster_name,
            self.requestor_kind,
            self.requestor_name,
            self.requestor_feature
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sveltos_common::{ConfigurationGroup, ConfigurationGroupSpec};

    fn sample_target() -> DeploymentTarget {
        DeploymentTarget::new("capi", "cluster-1", "ClusterSummary", "summary-a", "Helm")
    }

    #[test]
    fn test_labels_and_annotations() {
        let target = sample_target();
        let labels = target.labels();
        assert_eq!(labels.len(), 3);
        assert_eq!(labels[CLUSTER_NAME_LABEL], "cluster-1");
        assert_eq!(labels[REQUESTOR_KIND_LABEL], "ClusterSummary");
        assert_eq!(labels[REQUESTOR_FEATURE_LABEL], "Helm");

        let annotations = target.bundle_annotations("chart1");
        assert_eq!(annotations[REQUESTOR_NAME_ANNOTATION], "summary-a");
        assert_eq!(annotations[INDEX_ANNOTATION], "chart1");
    }

    #[test]
    fn test_long_requestor_name_is_allowed() {
        // 请求方名称保存在注解中，不受 63 字符限制
        let mut target = sample_target();
        target.requestor_name = "r".repeat(200);
        assert!(target.validate().is_ok());
    }

    #[test]
    fn test_invalid_label_values_rejected() {
        let mut target = sample_target();
        target.cluster_name = "c".repeat(64);
        assert!(matches!(target.validate(), Err(Error::InvalidResource(_))));

        let mut target = sample_target();
        target.requestor_feature = String::new();
        assert!(target.validate().is_err());

        let mut target = sample_target();
        target.cluster_namespace = String::new();
        assert!(target.validate().is_err());
    }

    #[test]
    fn test_owns_checks_requestor_annotation() {
        let target = sample_target();
        let mut group = ConfigurationGroup::new("cg-1", ConfigurationGroupSpec::default());
        assert!(!target.owns(&group));

        group.annotations_mut().extend(target.annotations());
        assert!(target.owns(&group));

        let other = DeploymentTarget::new("capi", "cluster-1", "ClusterSummary", "summary-b", "Helm");
        assert!(!other.owns(&group));
    }

    #[test]
    fn test_staging_key_ignores_requestor_kind() {
        let a = sample_target();
        let mut b = sample_target();
        b.requestor_kind = "ClusterProfile".to_string();
        assert_eq!(a.staging_key(), b.staging_key());
        assert_eq!(a.to_string(), "capi/cluster-1 ClusterSummary:summary-a/Helm");
    }
}
