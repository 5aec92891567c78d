//! 健康检查模块
//!
//! 提供服务健康状态检查和定期 Key 检测任务。

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::time::{Duration, interval};

use crate::pool::KeyPool;

/// 健康检查响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// 服务状态
    pub status: HealthStatus,
    /// 检查时间
    pub timestamp: String,
    /// 服务版本
    pub version: String,
    /// Key 池状态
    pub keys: KeysHealth,
}

/// 健康状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// 健康
    Healthy,
    /// 不健康（没有可用 Key 或存储不可读）
    Unhealthy,
}

/// Key 池健康状态
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeysHealth {
    /// 总 Key 数
    pub total: usize,
    /// 余额大于 0 的 Key 数
    pub eligible: usize,
    /// 可用余额总和
    pub total_balance: f64,
}

/// 健康检查状态
pub struct HealthCheckState {
    pub pool: Arc<KeyPool>,
    /// 服务版本
    pub version: String,
}

impl HealthCheckState {
    pub fn new(pool: Arc<KeyPool>) -> Self {
        Self {
            pool,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// GET /health
///
/// 返回服务健康状态，没有可用 Key 时返回 503
pub async fn health_check(State(state): State<Arc<HealthCheckState>>) -> Response {
    let timestamp = Utc::now().to_rfc3339();

    let keys = match state.pool.stats() {
        Ok(stats) => KeysHealth {
            total: stats.total,
            eligible: stats.eligible,
            total_balance: stats.total_balance,
        },
        Err(e) => {
            tracing::warn!("健康检查读取 Key 池失败: {}", e);
            KeysHealth::default()
        }
    };

    let status = if keys.eligible == 0 {
        HealthStatus::Unhealthy
    } else {
        HealthStatus::Healthy
    };

    let response = HealthResponse {
        status,
        timestamp,
        version: state.version.clone(),
        keys,
    };

    let status_code = match status {
        HealthStatus::Healthy => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(response)).into_response()
}

/// 启动后台定期检测任务
///
/// 每隔 `interval_secs` 检测一次全部 Key
pub fn start_auto_check_task(pool: Arc<KeyPool>, interval_secs: u64) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(interval_secs));
        ticker.tick().await; // 跳过第一次立即触发

        loop {
            ticker.tick().await;
            tracing::info!("执行定期 Key 检测");

            match pool.validate_all().await {
                Ok(outcome) => tracing::info!(
                    "定期检测完成: 总数={}, 通过={}, 失败={}",
                    outcome.total,
                    outcome.updated,
                    outcome.failed
                ),
                Err(e) => tracing::error!("定期检测失败: {}", e),
            }
        }
    })
}
