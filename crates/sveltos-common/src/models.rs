//! 数据模型模块
//!
//! 该模块定义了拉取模式使用的自定义资源：ConfigurationGroup、ConfigurationBundle
//! 以及它们共享的枚举与结构体，并提供序列化/反序列化功能。

pub mod configuration_bundle;
pub mod configuration_group;
pub mod shared;

/// Sveltos 库级 CRD 所在的 API 组
pub const API_GROUP: &str = "lib.projectsveltos.io";

/// Sveltos 库级 CRD 的 API 版本
pub const API_VERSION: &str = "v1beta1";
