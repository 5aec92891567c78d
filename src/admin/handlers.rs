//! Admin API HTTP 处理器
//!
//! 提供 Key 管理和检测相关的 HTTP 处理器

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    response::IntoResponse,
};

use super::{
    middleware::AdminState,
    types::{
        AddKeyRequest, BatchCheckResponse, BulkAddKeysRequest, BulkAddKeysResponse,
        CheckKeyResponse, CheckKeysRequest, KeyRequest, SuccessResponse,
    },
};
use crate::common::mask_key;
use crate::error::ProxyError;
use crate::store::sanitize_balance;

/// POST /api/admin/keys
/// 添加单个 Key
pub async fn add_key(
    State(state): State<AdminState>,
    payload: Result<Json<AddKeyRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ProxyError> {
    let Json(payload) = payload?;
    let balance = sanitize_balance(payload.balance.unwrap_or(0.0));
    state.pool.add_key(&payload.key, balance)?;
    Ok(Json(SuccessResponse::new(format!(
        "Key {} 已添加",
        mask_key(payload.key.trim())
    ))))
}

/// POST /api/admin/keys/bulk
/// 批量添加 Key（每行一个），并在后台检测新添加的 Key
pub async fn bulk_add_keys(
    State(state): State<AdminState>,
    payload: Result<Json<BulkAddKeysRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ProxyError> {
    let Json(payload) = payload?;
    let lines: Vec<&str> = payload.keys.lines().collect();
    let added = state.pool.add_keys(&lines)?;

    let pool = state.pool.clone();
    let to_check = added.clone();
    tokio::spawn(async move {
        if let Err(e) = pool.validate_many(&to_check).await {
            tracing::warn!("新添加 Key 的后台检测失败: {}", e);
        }
    });

    Ok(Json(BulkAddKeysResponse {
        success: true,
        message: format!("已添加 {} 个 Key", added.len()),
        count: added.len(),
        added_keys: added,
        auto_check: true,
    }))
}

/// DELETE /api/admin/keys
/// 删除 Key
pub async fn delete_key(
    State(state): State<AdminState>,
    payload: Result<Json<KeyRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ProxyError> {
    let Json(payload) = payload?;
    state.pool.delete_key(payload.key.trim())?;
    Ok(Json(SuccessResponse::new(format!(
        "Key {} 已删除",
        mask_key(payload.key.trim())
    ))))
}

/// POST /api/admin/keys/check
/// 检测单个 Key
pub async fn check_key(
    State(state): State<AdminState>,
    payload: Result<Json<KeyRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ProxyError> {
    let Json(payload) = payload?;
    let outcome = state.pool.validate_one(payload.key.trim()).await?;
    Ok(Json(CheckKeyResponse {
        success: true,
        outcome,
    }))
}

/// POST /api/admin/keys/check-all
/// 检测全部 Key（分批）
pub async fn check_all_keys(
    State(state): State<AdminState>,
) -> Result<impl IntoResponse, ProxyError> {
    let outcome = state.pool.validate_all().await?;
    Ok(Json(BatchCheckResponse::new(outcome)))
}

/// POST /api/admin/keys/check-many
/// 检测指定的一组 Key
pub async fn check_many_keys(
    State(state): State<AdminState>,
    payload: Result<Json<CheckKeysRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ProxyError> {
    let Json(payload) = payload?;
    if payload.keys.iter().all(|k| k.trim().is_empty()) {
        return Err(ProxyError::InvalidRequest("keys 不能为空".to_string()));
    }
    let outcome = state.pool.validate_many(&payload.keys).await?;
    Ok(Json(BatchCheckResponse::new(outcome)))
}
