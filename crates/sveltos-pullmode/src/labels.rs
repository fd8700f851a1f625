//! 标签与注解常量
//!
//! 拉取代理通过这些标签筛选属于本集群的 ConfigurationGroup，
//! 因此键名和取值必须与代理侧完全一致。

use kube::ResourceExt;
use once_cell::sync::Lazy;
use regex::Regex;

/// 受管集群名称
pub const CLUSTER_NAME_LABEL: &str = "projectsveltos.io/cluster-name";

/// 请求方类型（如 ClusterSummary）
pub const REQUESTOR_KIND_LABEL: &str = "projectsveltos.io/requestor-kind";

/// 请求方功能（如 Helm、Resources）
pub const REQUESTOR_FEATURE_LABEL: &str = "projectsveltos.io/requestor-feature";

/// 标记尚未提交的 ConfigurationBundle
pub const STAGED_LABEL: &str = "projectsveltos.io/staged";

/// 暂存标签的取值
pub const STAGED_LABEL_VALUE: &str = "ok";

/// 请求方名称，使用注解以绕开标签值 63 个字符的限制
pub const REQUESTOR_NAME_ANNOTATION: &str = "projectsveltos.io/requestor-name";

/// 区分同一请求方的多个 ConfigurationBundle（例如每个 Helm chart 一个）
pub const INDEX_ANNOTATION: &str = "projectsveltos.io/index";

/// 标签值最大长度
pub const MAX_LABEL_VALUE_LENGTH: usize = 63;

static LABEL_VALUE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(([A-Za-z0-9][-A-Za-z0-9_.]*)?[A-Za-z0-9])?$").expect("标签值正则表达式无效")
});

/// 检查字符串是否为合法的标签值
pub fn is_valid_label_value(value: &str) -> bool {
    value.len() <= MAX_LABEL_VALUE_LENGTH && LABEL_VALUE_REGEX.is_match(value)
}

/// 对象是否带有暂存标签
pub fn is_staged<K: ResourceExt>(object: &K) -> bool {
    object
        .labels()
        .get(STAGED_LABEL)
        .map(|value| value == STAGED_LABEL_VALUE)
        .unwrap_or(false)
}

/// 读取对象上的注解
pub fn annotation<'a, K: ResourceExt>(object: &'a K, key: &str) -> Option<&'a str> {
    object.annotations().get(key).map(String::as_str)
}
