//! Admin / 访客 API 类型定义

use serde::{Deserialize, Serialize};

use crate::model::settings::AccessControl;
use crate::pool::{BatchOutcome, ValidationOutcome};

// ============ 通用响应 ============

/// 带数据的成功响应 `{success: true, data}`
#[derive(Debug, Serialize)]
pub struct DataResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T> DataResponse<T> {
    pub fn new(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

/// 操作成功响应
#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
    pub message: String,
}

impl SuccessResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }
}

// ============ 访客 ============

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessControlInfo {
    pub access_control: AccessControl,
}

/// 访客密码核验请求
#[derive(Debug, Deserialize)]
pub struct VerifyGuestRequest {
    #[serde(default)]
    pub password: String,
}

/// 访客核验通过响应
#[derive(Debug, Serialize)]
pub struct GuestTokenResponse {
    pub success: bool,
    pub token: String,
}

/// 当前模式不使用访客密码时的响应
#[derive(Debug, Serialize)]
pub struct GuestNotRequiredResponse {
    pub success: bool,
    pub message: String,
}

// ============ Key 管理 ============

/// 添加单个 Key 请求
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddKeyRequest {
    pub key: String,
    /// 初始余额（可选，默认 0，等待检测）
    #[serde(default)]
    pub balance: Option<f64>,
}

/// 批量添加请求（每行一个 Key）
#[derive(Debug, Deserialize)]
pub struct BulkAddKeysRequest {
    pub keys: String,
}

/// 批量添加响应
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkAddKeysResponse {
    pub success: bool,
    pub message: String,
    pub count: usize,
    pub added_keys: Vec<String>,
    /// 新 Key 的检测已在后台启动
    pub auto_check: bool,
}

/// 指定单个 Key 的请求（删除 / 检测）
#[derive(Debug, Deserialize)]
pub struct KeyRequest {
    pub key: String,
}

/// 检测指定 Key 列表请求
#[derive(Debug, Deserialize)]
pub struct CheckKeysRequest {
    #[serde(default)]
    pub keys: Vec<String>,
}

/// 单个 Key 检测响应
#[derive(Debug, Serialize)]
pub struct CheckKeyResponse {
    pub success: bool,
    #[serde(flatten)]
    pub outcome: ValidationOutcome,
}

/// 批量检测响应
#[derive(Debug, Serialize)]
pub struct BatchCheckResponse {
    pub success: bool,
    pub message: String,
    #[serde(flatten)]
    pub outcome: BatchOutcome,
}

impl BatchCheckResponse {
    pub fn new(outcome: BatchOutcome) -> Self {
        Self {
            success: true,
            message: format!(
                "检测完成：通过 {}，失败 {}",
                outcome.updated, outcome.failed
            ),
            outcome,
        }
    }
}
