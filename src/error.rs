//! 对外 HTTP 错误
//!
//! 网关、访客和 Admin 接口共用同一套错误响应格式：
//! `{"success": false, "message": "...", "error": {"type": "...", "message": "..."}}`

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::model::settings::AccessControl;
use crate::pool::PoolError;
use crate::store::StoreError;

/// HTTP 层错误
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    /// 未认证（共享 Key 错误、Admin 认证失败或访客门禁拒绝）
    #[error("{message}")]
    Unauthenticated {
        message: String,
        /// 由访问门禁拒绝时附带当前模式
        access_control: Option<AccessControl>,
    },

    #[error("{0}")]
    NotFound(String),

    #[error("no available API keys")]
    NoCapacity,

    /// 转发到上游时的传输错误
    #[error("upstream request failed: {0}")]
    Upstream(String),

    #[error("{0}")]
    Internal(String),

    #[error("{0}")]
    InvalidRequest(String),
}

impl ProxyError {
    /// 共享 Key / Admin 认证失败
    pub fn unauthenticated() -> Self {
        ProxyError::Unauthenticated {
            message: "Unauthorized".to_string(),
            access_control: None,
        }
    }

    /// 访问门禁拒绝
    pub fn access_denied(mode: AccessControl) -> Self {
        let message = match mode {
            AccessControl::Restricted => "guest authentication required",
            _ => "admin authentication required",
        };
        ProxyError::Unauthenticated {
            message: message.to_string(),
            access_control: Some(mode),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ProxyError::Unauthenticated { .. } => StatusCode::UNAUTHORIZED,
            ProxyError::NotFound(_) => StatusCode::NOT_FOUND,
            ProxyError::NoCapacity => StatusCode::SERVICE_UNAVAILABLE,
            ProxyError::Upstream(_) | ProxyError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ProxyError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    pub fn error_type(&self) -> &'static str {
        match self {
            ProxyError::Unauthenticated { .. } => "authentication_error",
            ProxyError::NotFound(_) => "not_found",
            ProxyError::NoCapacity => "no_capacity",
            ProxyError::Upstream(_) => "upstream_error",
            ProxyError::Internal(_) => "internal_error",
            ProxyError::InvalidRequest(_) => "invalid_request",
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorDetail {
    #[serde(rename = "type")]
    error_type: &'static str,
    message: String,
}

/// 错误响应体
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    success: bool,
    message: String,
    error: ErrorDetail,
    #[serde(skip_serializing_if = "Option::is_none")]
    require_auth: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    access_control: Option<AccessControl>,
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = self.to_string();
        let (require_auth, access_control) = match &self {
            ProxyError::Unauthenticated { access_control, .. } => {
                (access_control.map(|_| true), *access_control)
            }
            _ => (None, None),
        };

        if status.is_server_error() {
            tracing::warn!("请求失败 ({}): {}", status, message);
        }

        let body = ErrorBody {
            success: false,
            message: message.clone(),
            error: ErrorDetail {
                error_type: self.error_type(),
                message,
            },
            require_auth,
            access_control,
        };
        (status, Json(body)).into_response()
    }
}

impl From<PoolError> for ProxyError {
    fn from(e: PoolError) -> Self {
        match e {
            PoolError::KeyNotFound { .. } => ProxyError::NotFound(e.to_string()),
            PoolError::NoCapacity => ProxyError::NoCapacity,
            PoolError::InvalidKey { .. } => ProxyError::InvalidRequest(e.to_string()),
            PoolError::Store(e) => e.into(),
        }
    }
}

impl From<JsonRejection> for ProxyError {
    fn from(e: JsonRejection) -> Self {
        ProxyError::InvalidRequest(format!("请求体格式错误: {}", e.body_text()))
    }
}

impl From<StoreError> for ProxyError {
    fn from(e: StoreError) -> Self {
        ProxyError::Internal(format!("存储错误: {}", e))
    }
}
