//! 代理网关
//!
//! 校验共享 API Key，从 Key 池选一个上游 Key 替换认证头后透明转发，
//! 并在所有响应上覆盖统一的 CORS / 禁止缓存响应头
//!
//! # 使用
//! ```ignore
//! let state = GatewayState::new(pool, settings, client, config.upstream_base());
//! let router = create_gateway_router(state);
//! ```

mod handlers;
mod middleware;
mod router;

pub use handlers::BILLING_PATH;
pub use middleware::{GatewayState, RESPONSE_HEADERS, preflight_middleware, with_response_headers};
pub use router::create_gateway_router;
