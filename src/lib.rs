//! keypool-rs Library
//!
//! 上游 API Key 池：Key 存储、有效性与余额检测、随机负载均衡和透明转发

pub mod access;
pub mod admin;
pub mod common;
pub mod error;
pub mod gateway;
pub mod health;
pub mod http_client;
pub mod model;
pub mod pool;
pub mod store;

#[cfg(test)]
pub(crate) mod test_support;

use std::sync::Arc;
use std::time::Duration;

use axum::{Router, routing::get};

use admin::AdminState;
use error::ProxyError;
use gateway::GatewayState;
use health::HealthCheckState;
use model::config::Config;
use model::settings::SettingsService;
use pool::{KeyPool, UpstreamValidator};
use store::KeyStore;

/// 按配置构建 Key 池（检测使用独立的短超时客户端）
pub fn build_pool(config: &Config, store: Arc<dyn KeyStore>) -> anyhow::Result<KeyPool> {
    let client = http_client::build_client(config.proxy().as_ref(), config.validation_timeout_secs)?;
    let validator = UpstreamValidator::new(
        client,
        config.upstream_base(),
        config.probe_model.clone(),
        config.probe_max_tokens,
    );
    Ok(KeyPool::new(store, Arc::new(validator)).with_batch_policy(
        config.validation_batch_size,
        Duration::from_millis(config.validation_batch_delay_ms),
    ))
}

/// 组装完整的 HTTP 应用
///
/// - `/v1/*` 网关转发
/// - `/api/*` 公开 / 访客接口
/// - `/api/admin/*` Admin 接口
/// - `/health` 健康检查
///
/// 所有响应（包括错误和 404）都带固定的 CORS / 禁止缓存响应头
pub fn build_app(
    pool: Arc<KeyPool>,
    settings: SettingsService,
    client: reqwest::Client,
    upstream_base: &str,
) -> Router {
    let gateway_state = GatewayState::new(pool.clone(), settings.clone(), client, upstream_base);
    let admin_state = AdminState::new(pool.clone(), settings);
    let health_state = Arc::new(HealthCheckState::new(pool));

    let router = Router::new()
        .route("/health", get(health::health_check))
        .with_state(health_state)
        .merge(gateway::create_gateway_router(gateway_state))
        .nest(
            "/api/admin",
            admin::create_admin_router(admin_state.clone()),
        )
        .nest("/api", admin::create_public_router(admin_state))
        .fallback(|| async { ProxyError::NotFound("not found".to_string()) });

    gateway::with_response_headers(router)
}
