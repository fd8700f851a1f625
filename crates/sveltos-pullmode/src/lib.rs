//! Sveltos Pull Mode - 拉取模式资源分发协议
//!
//! 管理集群中的组件通过该库发布需要部署到受管集群的资源。受管集群中的拉取代理
//! 读取 ConfigurationGroup，按其引用获取 ConfigurationBundle 并部署，
//! 然后在 ConfigurationGroup 状态中回报结果。
//!
//! 支持立即记录、暂存/提交/丢弃、移除和终止跟踪，
//! 以及基于 generation 和 requestor hash 的状态查询。

pub mod api;
pub mod bundle;
pub mod group;
pub mod labels;
pub mod options;
pub mod staging;
pub mod store;
pub mod target;
pub mod utils;

#[cfg(test)]
mod testing;

/// 重新导出常用类型，方便使用
pub use api::PullModeClient;
pub use options::{BundleOptions, GroupOptions};
pub use staging::{StagingKey, StagingRegistry};
pub use store::{KubeStore, MemoryStore, ObjectStore};
pub use target::DeploymentTarget;
