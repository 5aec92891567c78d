//! 网关路由配置

use axum::{Router, middleware, routing::any};

use super::{
    handlers::forward,
    middleware::{GatewayState, auth_middleware},
};

/// 创建网关路由
///
/// # 端点
/// - `ANY /v1/{*path}` - 转发到上游
/// - `/v1/dashboard/billing/subscription` - 本地应答余额汇总
///
/// # 认证
/// `Authorization: Bearer <共享 API Key>`
pub fn create_gateway_router(state: GatewayState) -> Router {
    Router::new()
        .route("/v1/{*path}", any(forward))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .with_state(state)
}
