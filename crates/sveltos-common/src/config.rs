//! 配置管理模块
//!
//! 该模块定义拉取模式的运行参数，支持从 YAML/JSON 文件加载，
//! 并允许通过 `SVELTOS_PULLMODE__*` 环境变量覆盖。

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

use crate::error::{Error, Result};

/// 环境变量前缀
pub const ENV_PREFIX: &str = "SVELTOS_PULLMODE";

/// 拉取模式运行参数
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PullModeSettings {
    /// 乐观并发冲突时的最大重试次数
    pub conflict_retries: u32,
    /// 首次重试前的等待时间（毫秒），之后每次翻倍
    pub conflict_backoff_ms: u64,
    /// 生成对象名称时随机后缀的长度
    pub name_suffix_length: usize,
}

impl Default for PullModeSettings {
    fn default() -> Self {
        Self {
            conflict_retries: 5,
            conflict_backoff_ms: 10,
            name_suffix_length: 12,
        }
    }
}

impl PullModeSettings {
    /// 从配置文件加载，环境变量优先
    pub fn from_file(path: &Path) -> Result<Self> {
        let config_file = path
            .to_str()
            .ok_or_else(|| Error::Config(format!("配置路径无效: {:?}", path)))?;

        // 确定配置文件格式
        let format = match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml") | Some("yml") => FileFormat::Yaml,
            Some("json") => FileFormat::Json,
            _ => {
                return Err(Error::Config(format!(
                    "不支持的配置文件格式: {}",
                    config_file
                )))
            }
        };

        let settings = Config::builder()
            .add_source(File::new(config_file, format))
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__").try_parsing(true))
            .build()
            .map_err(|e| Error::Config(e.to_string()))?
            .try_deserialize::<PullModeSettings>()
            .map_err(|e| Error::Config(e.to_string()))?;

        settings.validate()?;
        debug!("从 {} 加载拉取模式配置成功: {:?}", config_file, settings);

        Ok(settings)
    }

    /// 校验参数取值
    pub fn validate(&self) -> Result<()> {
        if self.conflict_retries == 0 {
            return Err(Error::Config("conflict_retries 必须大于 0".to_string()));
        }
        // 名称前缀加随机后缀不能超过 DNS 子域名长度限制
        if self.name_suffix_length < 5 || self.name_suffix_length > 40 {
            return Err(Error::Config(format!(
                "name_suffix_length 必须在 5 到 40 之间: {}",
                self.name_suffix_length
            )));
        }
        Ok(())
    }
}
