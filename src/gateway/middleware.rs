//! 网关中间件

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    extract::State,
    http::{HeaderName, HeaderValue, Method, Request, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tower_http::set_header::SetResponseHeaderLayer;

use crate::common::auth;
use crate::error::ProxyError;
use crate::model::settings::SettingsService;
use crate::pool::KeyPool;

/// 覆盖到每个响应上的固定响应头
pub const RESPONSE_HEADERS: [(HeaderName, &str); 8] = [
    (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
    (
        header::ACCESS_CONTROL_ALLOW_METHODS,
        "GET, POST, PUT, DELETE, OPTIONS",
    ),
    (
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        "Content-Type, Authorization, X-Requested-With",
    ),
    (header::ACCESS_CONTROL_ALLOW_CREDENTIALS, "true"),
    (header::ACCESS_CONTROL_MAX_AGE, "86400"),
    (
        header::CACHE_CONTROL,
        "no-store, no-cache, must-revalidate, proxy-revalidate",
    ),
    (header::PRAGMA, "no-cache"),
    (header::EXPIRES, "0"),
];

/// 网关共享状态
#[derive(Clone)]
pub struct GatewayState {
    pub pool: Arc<KeyPool>,
    pub settings: SettingsService,
    /// 转发用 HTTP 客户端
    pub client: reqwest::Client,
    /// 上游地址（不带末尾斜杠）
    pub upstream_base: Arc<str>,
}

impl GatewayState {
    pub fn new(
        pool: Arc<KeyPool>,
        settings: SettingsService,
        client: reqwest::Client,
        upstream_base: impl AsRef<str>,
    ) -> Self {
        Self {
            pool,
            settings,
            client,
            upstream_base: Arc::from(upstream_base.as_ref().trim_end_matches('/')),
        }
    }
}

/// 共享 API Key 认证中间件
///
/// 认证通过前不会选择任何上游 Key
pub async fn auth_middleware(
    State(state): State<GatewayState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let Some(token) = auth::extract_bearer_token(request.headers()) else {
        return ProxyError::unauthenticated().into_response();
    };

    let expected = match state.settings.api_key() {
        Ok(key) => key,
        Err(e) => return ProxyError::from(e).into_response(),
    };

    if auth::constant_time_eq(&token, &expected) {
        next.run(request).await
    } else {
        tracing::debug!("共享 API Key 校验失败: {}", request.uri().path());
        ProxyError::unauthenticated().into_response()
    }
}

/// 预检请求中间件：任意路径的 OPTIONS 直接返回 204
pub async fn preflight_middleware(request: Request<Body>, next: Next) -> Response {
    if request.method() == Method::OPTIONS {
        return StatusCode::NO_CONTENT.into_response();
    }
    next.run(request).await
}

/// 为路由加上预检处理和固定响应头
pub fn with_response_headers(router: Router) -> Router {
    let mut router = router.layer(axum::middleware::from_fn(preflight_middleware));
    for (name, value) in RESPONSE_HEADERS {
        router = router.layer(SetResponseHeaderLayer::overriding(
            name,
            HeaderValue::from_static(value),
        ));
    }
    router
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::get;
    use tower::ServiceExt;

    fn app() -> Router {
        let router = Router::new().route(
            "/ping",
            get(|| async {
                (
                    [(header::CACHE_CONTROL, "max-age=3600")],
                    "pong",
                )
            }),
        );
        with_response_headers(router)
    }

    fn assert_overlay(response: &Response) {
        for (name, value) in RESPONSE_HEADERS {
            assert_eq!(
                response.headers().get(&name).and_then(|v| v.to_str().ok()),
                Some(value),
                "响应头 {} 不符合预期",
                name
            );
        }
    }

    #[tokio::test]
    async fn test_overlay_overrides_handler_headers() {
        let response = app()
            .oneshot(Request::get("/ping").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_overlay(&response);
        assert_eq!(response.headers().get_all(header::CACHE_CONTROL).iter().count(), 1);
    }

    #[tokio::test]
    async fn test_options_answered_with_no_content() {
        let response = app()
            .oneshot(
                Request::builder()
                    .method(Method::OPTIONS)
                    .uri("/ping")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_overlay(&response);
    }
}
