//! Admin API 中间件

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::access::AccessGate;
use crate::model::settings::SettingsService;
use crate::pool::KeyPool;

/// Admin / 访客 API 共享状态
#[derive(Clone)]
pub struct AdminState {
    pub pool: Arc<KeyPool>,
    pub settings: SettingsService,
    pub gate: AccessGate,
}

impl AdminState {
    pub fn new(pool: Arc<KeyPool>, settings: SettingsService) -> Self {
        Self {
            pool,
            gate: AccessGate::new(settings.clone()),
            settings,
        }
    }
}

/// Admin API 认证中间件（Basic 认证）
pub async fn admin_auth_middleware(
    State(state): State<AdminState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    match state.gate.check_admin(request.headers()) {
        Ok(()) => next.run(request).await,
        Err(e) => {
            tracing::debug!("Admin 认证失败: {} {}", request.method(), request.uri().path());
            e.into_response()
        }
    }
}
