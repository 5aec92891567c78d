//! 网关转发处理器

use axum::{
    Json,
    body::{Body, to_bytes},
    extract::State,
    http::{HeaderMap, HeaderValue, Method, Request, header},
    response::{IntoResponse, Response},
};
use serde_json::json;
use uuid::Uuid;

use super::middleware::GatewayState;
use crate::common::mask_key;
use crate::error::ProxyError;

/// 本地应答的账单摘要路径
pub const BILLING_PATH: &str = "/v1/dashboard/billing/subscription";

/// 请求体最大大小限制 (50MB)
const MAX_BODY_SIZE: usize = 50 * 1024 * 1024;

/// 逐跳头，不转发
const HOP_BY_HOP_HEADERS: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP_HEADERS.contains(&name)
}

/// 构建转发到上游的请求头
///
/// 去掉 Host、Content-Length 和逐跳头，Authorization 替换为选中的上游 Key
fn upstream_headers(inbound: &HeaderMap, key: &str) -> Result<HeaderMap, ProxyError> {
    let mut headers = HeaderMap::with_capacity(inbound.len());
    for (name, value) in inbound {
        if *name == header::HOST
            || *name == header::CONTENT_LENGTH
            || *name == header::AUTHORIZATION
            || is_hop_by_hop(name.as_str())
        {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }

    let auth = HeaderValue::from_str(&format!("Bearer {}", key))
        .map_err(|_| ProxyError::Internal(format!("上游 Key 含非法字符: {}", mask_key(key))))?;
    headers.insert(header::AUTHORIZATION, auth);
    Ok(headers)
}

/// 账单摘要：返回所有可用 Key 的余额总和
fn billing_summary(state: &GatewayState) -> Result<Response, ProxyError> {
    let balance = state.pool.total_balance()?;
    Ok(Json(json!({
        "code": 200,
        "message": "ok",
        "status": true,
        "success": true,
        "balance": balance,
        "data": { "balance": balance },
    }))
    .into_response())
}

/// ANY /v1/{*path}
/// 转发到上游
pub async fn forward(
    State(state): State<GatewayState>,
    request: Request<Body>,
) -> Result<Response, ProxyError> {
    if request.uri().path() == BILLING_PATH {
        return billing_summary(&state);
    }

    let key = state.pool.select()?;

    let (parts, body) = request.into_parts();
    let request_id = Uuid::new_v4();
    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or_else(|| parts.uri.path());
    let url = format!("{}{}", state.upstream_base, path_and_query);

    tracing::debug!(
        "[{}] {} {} -> Key {}",
        request_id,
        parts.method,
        parts.uri.path(),
        mask_key(&key)
    );

    let headers = upstream_headers(&parts.headers, &key)?;
    let mut upstream = state
        .client
        .request(parts.method.clone(), url)
        .headers(headers);

    if parts.method != Method::GET && parts.method != Method::HEAD {
        let body = to_bytes(body, MAX_BODY_SIZE)
            .await
            .map_err(|e| ProxyError::InvalidRequest(format!("读取请求体失败: {}", e)))?;
        upstream = upstream.body(body);
    }

    let response = upstream.send().await.map_err(|e| {
        tracing::warn!("[{}] 上游请求失败: {}", request_id, e);
        ProxyError::Upstream(e.to_string())
    })?;

    tracing::debug!("[{}] 上游响应 {}", request_id, response.status());

    let mut builder = Response::builder().status(response.status());
    if let Some(headers) = builder.headers_mut() {
        for (name, value) in response.headers() {
            if !is_hop_by_hop(name.as_str()) {
                headers.append(name.clone(), value.clone());
            }
        }
    }

    builder
        .body(Body::from_stream(response.bytes_stream()))
        .map_err(|e| ProxyError::Internal(format!("构建响应失败: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_headers_strip_and_replace() {
        let mut inbound = HeaderMap::new();
        inbound.insert(header::HOST, HeaderValue::from_static("proxy.local"));
        inbound.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer shared"));
        inbound.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
        inbound.insert(header::CONTENT_LENGTH, HeaderValue::from_static("12"));
        inbound.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        inbound.append("x-custom", HeaderValue::from_static("a"));
        inbound.append("x-custom", HeaderValue::from_static("b"));

        let headers = upstream_headers(&inbound, "sk-upstream").unwrap();
        assert!(headers.get(header::HOST).is_none());
        assert!(headers.get(header::CONNECTION).is_none());
        assert!(headers.get(header::CONTENT_LENGTH).is_none());
        assert_eq!(headers.get(header::AUTHORIZATION).unwrap(), "Bearer sk-upstream");
        assert_eq!(headers.get(header::CONTENT_TYPE).unwrap(), "application/json");
        assert_eq!(headers.get_all("x-custom").iter().count(), 2);
    }

    #[test]
    fn test_upstream_headers_rejects_bad_key() {
        assert!(upstream_headers(&HeaderMap::new(), "bad\nkey").is_err());
    }
}
