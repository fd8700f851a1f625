//! Sveltos Common - 拉取模式共享的数据模型、错误类型与配置
//!
//! 该模块提供拉取模式（pull mode）各组件共享的 CRD 数据模型、统一的错误处理机制
//! 以及可从文件和环境变量加载的运行参数。

pub mod config;
pub mod error;
pub mod models;

/// 重新导出常用类型，方便使用
pub use config::PullModeSettings;
pub use error::{Error, ProcessingMismatchError, Result};
pub use models::configuration_bundle::*;
pub use models::configuration_group::*;
pub use models::shared::*;
