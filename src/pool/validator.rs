//! 上游 Key 有效性与余额检测
//!
//! 两步检测：先发一个极小的对话请求确认 Key 可用，
//! 成功后再查询账户余额，失效的 Key 不会触达余额接口

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::{Value, json};

use crate::common::mask_key;
use crate::store::sanitize_balance;

/// 探测接口路径
pub const PROBE_PATH: &str = "/v1/chat/completions";
/// 账户信息（余额）接口路径
pub const USER_INFO_PATH: &str = "/v1/user/info";

/// 单个 Key 的检测结果
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub is_valid: bool,
    pub balance: f64,
    pub message: String,
}

impl ValidationResult {
    pub fn valid(balance: f64) -> Self {
        Self {
            is_valid: true,
            balance: sanitize_balance(balance),
            message: "ok".to_string(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            balance: 0.0,
            message: message.into(),
        }
    }
}

/// Key 检测器
///
/// 实现方不得返回错误：任何失败都折算为 `is_valid = false`
#[async_trait]
pub trait KeyValidator: Send + Sync {
    async fn validate(&self, key: &str) -> ValidationResult;
}

/// 调用上游 API 的检测器
pub struct UpstreamValidator {
    client: Client,
    base_url: String,
    probe_model: String,
    probe_max_tokens: u32,
}

impl UpstreamValidator {
    pub fn new(
        client: Client,
        base_url: impl Into<String>,
        probe_model: impl Into<String>,
        probe_max_tokens: u32,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            probe_model: probe_model.into(),
            probe_max_tokens,
        }
    }

    async fn check(&self, key: &str) -> Result<ValidationResult, reqwest::Error> {
        // 1. 探测 Key 是否可用
        let body = json!({
            "model": self.probe_model,
            "messages": [{"role": "user", "content": "hi"}],
            "max_tokens": self.probe_max_tokens,
            "stream": false,
        });
        let response = self
            .client
            .post(format!("{}{}", self.base_url, PROBE_PATH))
            .bearer_auth(key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let payload = response.text().await.unwrap_or_default();
            tracing::debug!("Key {} 探测失败: {}", mask_key(key), status);
            return Ok(ValidationResult::invalid(
                error_message(&payload).unwrap_or_else(|| "key validation failed".to_string()),
            ));
        }

        // 2. 查询余额
        let response = self
            .client
            .get(format!("{}{}", self.base_url, USER_INFO_PATH))
            .bearer_auth(key)
            .send()
            .await?;

        let status = response.status();
        let payload = response.text().await?;
        if !status.is_success() {
            tracing::debug!("Key {} 余额查询失败: {}", mask_key(key), status);
            return Ok(ValidationResult::invalid(
                error_message(&payload).unwrap_or_else(|| "balance query failed".to_string()),
            ));
        }

        Ok(ValidationResult::valid(parse_balance(&payload)))
    }
}

#[async_trait]
impl KeyValidator for UpstreamValidator {
    async fn validate(&self, key: &str) -> ValidationResult {
        match self.check(key).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!("检测 Key {} 时网络错误: {}", mask_key(key), e);
                ValidationResult::invalid(format!("network error: {}", e))
            }
        }
    }
}

/// 从上游错误响应中提取错误信息
///
/// 依次尝试 `error.message`、`message`、字符串形式的 `error`
fn error_message(payload: &str) -> Option<String> {
    let value: Value = serde_json::from_str(payload).ok()?;
    value
        .pointer("/error/message")
        .or_else(|| value.get("message"))
        .or_else(|| value.get("error"))
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .map(|s| s.to_string())
}

/// 从账户信息响应中解析 `data.totalBalance`
///
/// 数字和数字字符串都接受，缺失或格式错误视为 0
fn parse_balance(payload: &str) -> f64 {
    let Ok(value) = serde_json::from_str::<Value>(payload) else {
        return 0.0;
    };
    let balance = match value.pointer("/data/totalBalance") {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    };
    sanitize_balance(balance)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::spawn_upstream;
    use axum::{
        Json, Router,
        http::{HeaderMap, StatusCode},
        response::IntoResponse,
        routing::{get, post},
    };
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn bearer(headers: &HeaderMap) -> String {
        headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .trim_start_matches("Bearer ")
            .to_string()
    }

    /// 模拟上游：sk-good 有余额，sk-empty 余额字段缺失，
    /// sk-nobalance 余额接口报错，其余 Key 探测失败
    fn fake_upstream(balance_calls: Arc<AtomicUsize>) -> Router {
        Router::new()
            .route(
                PROBE_PATH,
                post(|headers: HeaderMap| async move {
                    match bearer(&headers).as_str() {
                        "sk-good" | "sk-empty" | "sk-nobalance" => {
                            (StatusCode::OK, Json(json!({"choices": []}))).into_response()
                        }
                        "sk-html" => (StatusCode::FORBIDDEN, "<html>denied</html>").into_response(),
                        _ => (
                            StatusCode::UNAUTHORIZED,
                            Json(json!({"error": {"message": "Invalid token"}})),
                        )
                            .into_response(),
                    }
                }),
            )
            .route(
                USER_INFO_PATH,
                get(move |headers: HeaderMap| {
                    let balance_calls = balance_calls.clone();
                    async move {
                        balance_calls.fetch_add(1, Ordering::SeqCst);
                        match bearer(&headers).as_str() {
                            "sk-good" => (
                                StatusCode::OK,
                                Json(json!({"data": {"totalBalance": "14.25"}})),
                            )
                                .into_response(),
                            "sk-nobalance" => (
                                StatusCode::INTERNAL_SERVER_ERROR,
                                Json(json!({"message": "account service down"})),
                            )
                                .into_response(),
                            _ => (StatusCode::OK, Json(json!({"data": {}}))).into_response(),
                        }
                    }
                }),
            )
    }

    async fn validator(balance_calls: Arc<AtomicUsize>) -> UpstreamValidator {
        let base = spawn_upstream(fake_upstream(balance_calls)).await;
        UpstreamValidator::new(Client::new(), base, "test-model", 1)
    }

    #[tokio::test]
    async fn test_valid_key_reads_string_balance() {
        let calls = Arc::new(AtomicUsize::new(0));
        let result = validator(calls.clone()).await.validate("sk-good").await;
        assert!(result.is_valid);
        assert_eq!(result.balance, 14.25);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_balance_counts_as_zero() {
        let result = validator(Arc::new(AtomicUsize::new(0)))
            .await
            .validate("sk-empty")
            .await;
        assert!(result.is_valid);
        assert_eq!(result.balance, 0.0);
    }

    #[tokio::test]
    async fn test_failed_probe_skips_balance_lookup() {
        let calls = Arc::new(AtomicUsize::new(0));
        let result = validator(calls.clone()).await.validate("sk-bad").await;
        assert!(!result.is_valid);
        assert_eq!(result.balance, 0.0);
        assert_eq!(result.message, "Invalid token");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unparseable_error_payload_uses_generic_message() {
        let result = validator(Arc::new(AtomicUsize::new(0)))
            .await
            .validate("sk-html")
            .await;
        assert!(!result.is_valid);
        assert_eq!(result.message, "key validation failed");
    }

    #[tokio::test]
    async fn test_balance_endpoint_error_marks_invalid() {
        let result = validator(Arc::new(AtomicUsize::new(0)))
            .await
            .validate("sk-nobalance")
            .await;
        assert!(!result.is_valid);
        assert_eq!(result.balance, 0.0);
        assert_eq!(result.message, "account service down");
    }

    #[tokio::test]
    async fn test_network_error_is_reported_not_raised() {
        // 端口 1 上没有服务
        let validator = UpstreamValidator::new(Client::new(), "http://127.0.0.1:1", "m", 1);
        let result = validator.validate("sk-any").await;
        assert!(!result.is_valid);
        assert!(result.message.starts_with("network error"));
    }

    #[test]
    fn test_parse_balance() {
        assert_eq!(parse_balance(r#"{"data":{"totalBalance":3.5}}"#), 3.5);
        assert_eq!(parse_balance(r#"{"data":{"totalBalance":"7"}}"#), 7.0);
        assert_eq!(parse_balance(r#"{"data":{"totalBalance":"abc"}}"#), 0.0);
        assert_eq!(parse_balance(r#"{"data":{"totalBalance":-2}}"#), 0.0);
        assert_eq!(parse_balance("not json"), 0.0);
    }

    #[test]
    fn test_error_message() {
        assert_eq!(
            error_message(r#"{"error":{"message":"quota"}}"#).as_deref(),
            Some("quota")
        );
        assert_eq!(error_message(r#"{"message":"bad"}"#).as_deref(), Some("bad"));
        assert_eq!(error_message(r#"{"error":"plain"}"#).as_deref(), Some("plain"));
        assert!(error_message(r#"{"error":{"code":1}}"#).is_none());
        assert!(error_message("<html>").is_none());
    }
}
