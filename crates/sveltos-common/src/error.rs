//! 错误处理模块
//!
//! 该模块提供拉取模式的统一错误类型。调用方需要区分的几类情况
//! （对象不存在、代理尚未处理最新状态、并发重复对象、对象正在删除、乐观并发冲突）
//! 都有独立的变体，其余的存储错误原样透传。

use thiserror::Error;

use crate::models::configuration_group::ConfigurationGroupStatus;

/// Sveltos 拉取模式统一错误类型
#[derive(Error, Debug)]
pub enum Error {
    /// 对象不存在
    #[error("{kind} {namespace}/{name} 不存在")]
    NotFound {
        kind: String,
        namespace: String,
        name: String,
    },

    /// 数据存在，但尚未反映最新的期望状态
    #[error(transparent)]
    ProcessingMismatch(#[from] ProcessingMismatchError),

    /// 同一元组下存在多个对象，已尽力全部删除
    #[error("命名空间 {namespace} 中找到 {count} 个 {kind} 对象（期望最多一个），已删除全部，请重试")]
    Duplicate {
        kind: String,
        namespace: String,
        count: usize,
    },

    /// 对象存在但已被标记删除
    #[error("{kind} {namespace}/{name} 正在删除中，请稍后重试")]
    DeletionInProgress {
        kind: String,
        namespace: String,
        name: String,
    },

    /// 乐观并发冲突（resourceVersion 不一致）
    #[error("{kind} {namespace}/{name} 更新冲突: {message}")]
    Conflict {
        kind: String,
        namespace: String,
        name: String,
        message: String,
    },

    /// 无效的资源或参数
    #[error("无效的资源: {0}")]
    InvalidResource(String),

    /// Kubernetes API 错误
    #[error("Kubernetes API 错误: {0}")]
    Kube(#[from] kube::Error),

    /// JSON 错误
    #[error("JSON 错误: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML 错误
    #[error("YAML 错误: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// 配置错误
    #[error("配置错误: {0}")]
    Config(String),
}

/// Sveltos 拉取模式结果类型别名
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// 创建对象不存在错误
    pub fn not_found(kind: &str, namespace: &str, name: &str) -> Self {
        Error::NotFound {
            kind: kind.to_string(),
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }

    /// 创建正在删除错误
    pub fn deletion_in_progress(kind: &str, namespace: &str, name: &str) -> Self {
        Error::DeletionInProgress {
            kind: kind.to_string(),
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }

    /// 创建冲突错误
    pub fn conflict(kind: &str, namespace: &str, name: &str, message: impl Into<String>) -> Self {
        Error::Conflict {
            kind: kind.to_string(),
            namespace: namespace.to_string(),
            name: name.to_string(),
            message: message.into(),
        }
    }

    /// 是否为对象不存在错误（包括 API 服务器返回的 404）
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound { .. } => true,
            Error::Kube(kube::Error::Api(response)) => response.code == 404,
            _ => false,
        }
    }

    /// 是否为乐观并发冲突（包括 API 服务器返回的 409）
    pub fn is_conflict(&self) -> bool {
        match self {
            Error::Conflict { .. } => true,
            Error::Kube(kube::Error::Api(response)) => response.code == 409,
            _ => false,
        }
    }

    /// 是否为处理状态不一致错误
    pub fn is_processing_mismatch(&self) -> bool {
        matches!(self, Error::ProcessingMismatch(_))
    }

    /// 是否为正在删除错误
    pub fn is_deletion_in_progress(&self) -> bool {
        matches!(self, Error::DeletionInProgress { .. })
    }

    /// 取出处理状态不一致错误中携带的（可能已过期的）状态
    pub fn stale_status(&self) -> Option<&ConfigurationGroupStatus> {
        match self {
            Error::ProcessingMismatch(mismatch) => mismatch.stale_status.as_deref(),
            _ => None,
        }
    }
}

/// 处理状态不一致错误
///
/// 表示 ConfigurationGroup 存在，但代理尚未处理最新的期望状态
/// （动作/阶段不符、generation 或 requestor hash 不一致）。
/// 调用方应轮询重试，而不是当作致命错误。
#[derive(Error, Debug, Clone)]
#[error("处理状态不一致: {message}")]
pub struct ProcessingMismatchError {
    /// 不一致的原因
    pub message: String,
    /// 读取到的状态（可能已过期），便于调用方记录或展示
    pub stale_status: Option<Box<ConfigurationGroupStatus>>,
}

impl ProcessingMismatchError {
    /// 创建不携带状态的处理状态不一致错误
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stale_status: None,
        }
    }

    /// 附带过期状态
    pub fn with_stale_status(mut self, status: ConfigurationGroupStatus) -> Self {
        self.stale_status = Some(Box::new(status));
        self
    }
}
