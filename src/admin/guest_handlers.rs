//! 公开 / 访客接口处理器

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::HeaderMap,
    response::{IntoResponse, Response},
};

use super::{
    middleware::AdminState,
    types::{
        AccessControlInfo, DataResponse, GuestNotRequiredResponse, GuestTokenResponse,
        VerifyGuestRequest,
    },
};
use crate::access::GuestVerification;
use crate::error::ProxyError;

/// GET /api/page-size
pub async fn get_page_size(
    State(state): State<AdminState>,
) -> Result<impl IntoResponse, ProxyError> {
    Ok(Json(DataResponse::new(state.settings.page_size()?)))
}

/// GET /api/access-control
pub async fn get_access_control(
    State(state): State<AdminState>,
) -> Result<impl IntoResponse, ProxyError> {
    let access_control = state.settings.access_control()?;
    Ok(Json(DataResponse::new(AccessControlInfo { access_control })))
}

/// POST /api/verify-guest
/// 核验访客密码，restricted 模式下通过后返回访客 token
pub async fn verify_guest(
    State(state): State<AdminState>,
    payload: Result<Json<VerifyGuestRequest>, JsonRejection>,
) -> Result<Response, ProxyError> {
    let Json(payload) = payload?;
    match state.gate.verify_guest(&payload.password)? {
        GuestVerification::Granted(token) => Ok(Json(GuestTokenResponse {
            success: true,
            token,
        })
        .into_response()),
        GuestVerification::Denied => Err(ProxyError::Unauthenticated {
            message: "访客密码不正确".to_string(),
            access_control: None,
        }),
        GuestVerification::NotRequired(mode) => Ok(Json(GuestNotRequiredResponse {
            success: false,
            message: format!("当前模式 ({}) 不需要访客认证", mode),
        })
        .into_response()),
    }
}

/// GET /api/keys
/// Key 列表（按余额降序），需要管理员认证或通过访问门禁
pub async fn list_keys(
    State(state): State<AdminState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ProxyError> {
    state.gate.check_admin_or_guest(&headers)?;
    Ok(Json(DataResponse::new(state.pool.list()?)))
}
