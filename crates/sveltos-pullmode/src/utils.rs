//! 拉取模式工具函数
//!
//! 包括对象命名、资源清理、内容哈希和冲突重试等辅助函数。

use kube::api::DynamicObject;
use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use sha2::{Digest, Sha256};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use sveltos_common::{PullModeSettings, Result};

/// 生成随机的对象名称
///
/// 名称由前缀和小写字母数字后缀组成，满足 DNS 子域名规则。
pub fn generate_name(prefix: &str, length: usize) -> String {
    let random_part: String = thread_rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(|c| char::from(c).to_ascii_lowercase())
        .collect();

    format!("{}-{}", prefix, random_part)
}

/// 去掉由 API 服务器维护的字段（resourceVersion、uid、managedFields）
pub fn strip_server_fields(resource: &DynamicObject) -> DynamicObject {
    let mut stripped = resource.clone();
    stripped.metadata.resource_version = None;
    stripped.metadata.uid = None;
    stripped.metadata.managed_fields = None;
    stripped
}

/// 计算一组资源的内容哈希
///
/// 依次序列化每个资源为 JSON（字段按键排序）并拼接，取 sha256。
/// 调用方应先用 [`strip_server_fields`] 清理资源。
pub fn compute_hash(resources: &[DynamicObject]) -> Result<Vec<u8>> {
    let mut hasher = Sha256::new();
    for resource in resources {
        let canonical = serde_json::to_value(resource)?.to_string();
        hasher.update(canonical.as_bytes());
    }
    Ok(hasher.finalize().to_vec())
}

/// 将资源渲染为 YAML 清单
pub fn render_resources(resources: &[DynamicObject]) -> Result<Vec<String>> {
    resources
        .iter()
        .map(|resource| Ok(serde_yaml::to_string(resource)?))
        .collect()
}

/// 在乐观并发冲突时重试异步操作
///
/// 最多执行 `conflict_retries` 次，每次等待时间翻倍。
/// 非冲突错误立即返回。
pub async fn retry_on_conflict<F, Fut, T>(settings: &PullModeSettings, f: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut delay = Duration::from_millis(settings.conflict_backoff_ms);
    let mut attempt = 1;

    loop {
        match f().await {
            Err(e) if e.is_conflict() && attempt < settings.conflict_retries => {
                warn!("第 {} 次尝试发生冲突: {}，{:?} 后重试", attempt, e, delay);
                tokio::time::sleep(delay).await;
                delay *= 2;
                attempt += 1;
            }
            Err(e) => return Err(e),
            Ok(value) => {
                if attempt > 1 {
                    debug!("第 {} 次尝试成功", attempt);
                }
                return Ok(value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use sveltos_common::Error;

    fn config_map(name: &str, data: serde_json::Value) -> DynamicObject {
        serde_json::from_value(json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {"name": name, "namespace": "default"},
            "data": data,
        }))
        .unwrap()
    }

    fn fast_settings(retries: u32) -> PullModeSettings {
        PullModeSettings {
            conflict_retries: retries,
            conflict_backoff_ms: 1,
            ..Default::default()
        }
    }

    #[test]
    fn test_generate_name() {
        let name1 = generate_name("cb", 12);
        let name2 = generate_name("cb", 12);

        assert!(name1.starts_with("cb-"));
        assert_eq!(name1.len(), 15);
        assert!(name1.chars().all(|c| c == '-' || c.is_ascii_lowercase() || c.is_ascii_digit()));
        assert_ne!(name1, name2);
    }

    #[test]
    fn test_empty_hash() {
        let hash = compute_hash(&[]).unwrap();
        let hex: String = hash.iter().map(|b| format!("{:02x}", b)).collect();
        assert_eq!(
            hex,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_hash_ignores_server_fields() {
        let plain = config_map("cm", json!({"a": "1"}));
        let mut served = plain.clone();
        served.metadata.resource_version = Some("42".to_string());
        served.metadata.uid = Some("1234".to_string());

        assert_ne!(
            compute_hash(&[plain.clone()]).unwrap(),
            compute_hash(&[served.clone()]).unwrap()
        );
        assert_eq!(
            compute_hash(&[plain]).unwrap(),
            compute_hash(&[strip_server_fields(&served)]).unwrap()
        );
    }

    #[test]
    fn test_hash_depends_on_content_and_order() {
        let a = config_map("a", json!({"k": "v"}));
        let b = config_map("b", json!({"k": "v"}));
        let changed = config_map("a", json!({"k": "w"}));

        let ab = compute_hash(&[a.clone(), b.clone()]).unwrap();
        assert_eq!(ab.len(), 32);
        assert_eq!(ab, compute_hash(&[a.clone(), b.clone()]).unwrap());
        assert_ne!(ab, compute_hash(&[b.clone(), a.clone()]).unwrap());
        assert_ne!(ab, compute_hash(&[changed, b]).unwrap());
    }

    #[test]
    fn test_render_resources() {
        let rendered = render_resources(&[config_map("cm", json!({"k": "v"}))]).unwrap();
        assert_eq!(rendered.len(), 1);
        assert!(rendered[0].contains("kind: ConfigMap"));
        assert!(rendered[0].contains("name: cm"));

        let parsed: DynamicObject = serde_yaml::from_str(&rendered[0]).unwrap();
        assert_eq!(parsed.data["data"]["k"], "v");
    }

    #[tokio::test]
    async fn test_retry_on_conflict_eventually_succeeds() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result = retry_on_conflict(&fast_settings(5), move || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(Error::conflict("ConfigurationBundle", "capi", "cb-1", "stale"))
            } else {
                Ok("done")
            }
        })
        .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_on_conflict_gives_up() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<()> = retry_on_conflict(&fast_settings(3), move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::conflict("ConfigurationBundle", "capi", "cb-1", "stale"))
        })
        .await;

        assert!(result.unwrap_err().is_conflict());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_on_conflict_skips_other_errors() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<()> = retry_on_conflict(&fast_settings(5), move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::not_found("ConfigurationBundle", "capi", "cb-1"))
        })
        .await;

        assert!(result.unwrap_err().is_not_found());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
