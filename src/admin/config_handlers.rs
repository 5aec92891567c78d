//! 设置管理 HTTP 处理器
//!
//! 提供代理运行时设置的读取和更新功能

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    response::IntoResponse,
};

use super::{
    middleware::AdminState,
    types::{DataResponse, SuccessResponse},
};
use crate::error::ProxyError;
use crate::model::settings::UpdateSettings;

/// GET /api/admin/config
/// 获取当前设置（已应用默认值）
pub async fn get_config(State(state): State<AdminState>) -> Result<impl IntoResponse, ProxyError> {
    let settings = state.settings.settings()?;
    Ok(Json(DataResponse::new(settings)))
}

/// PUT /api/admin/config
/// 更新设置（只写入提供的字段）
pub async fn update_config(
    State(state): State<AdminState>,
    payload: Result<Json<UpdateSettings>, JsonRejection>,
) -> Result<impl IntoResponse, ProxyError> {
    let Json(payload) = payload?;
    if payload.is_empty() {
        return Err(ProxyError::InvalidRequest("没有需要更新的字段".to_string()));
    }
    payload
        .validate()
        .map_err(|errors| ProxyError::InvalidRequest(errors.join("; ")))?;

    state.settings.update(payload)?;
    Ok(Json(SuccessResponse::new("设置已更新")))
}
