//! Admin / 访客 API 路由配置

use axum::{
    Router, middleware,
    routing::{get, post},
};

use super::{
    config_handlers::{get_config, update_config},
    guest_handlers::{get_access_control, get_page_size, list_keys, verify_guest},
    handlers::{
        add_key, bulk_add_keys, check_all_keys, check_key, check_many_keys, delete_key,
    },
    middleware::{AdminState, admin_auth_middleware},
};

/// 创建 Admin API 路由（挂载在 `/api/admin`）
///
/// # 端点
///
/// ## 设置管理
/// - `GET /config` - 获取当前设置
/// - `PUT /config` - 更新设置
///
/// ## Key 管理
/// - `POST /keys` - 添加单个 Key
/// - `DELETE /keys` - 删除 Key
/// - `POST /keys/bulk` - 批量添加（每行一个）
///
/// ## Key 检测
/// - `POST /keys/check` - 检测单个 Key
/// - `POST /keys/check-all` - 检测全部 Key
/// - `POST /keys/check-many` - 检测指定 Key
///
/// # 认证
/// `Authorization: Basic base64(adminUsername:adminPassword)`
pub fn create_admin_router(state: AdminState) -> Router {
    Router::new()
        // 设置管理
        .route("/config", get(get_config).put(update_config))
        // Key 管理
        .route("/keys", post(add_key).delete(delete_key))
        .route("/keys/bulk", post(bulk_add_keys))
        // Key 检测
        .route("/keys/check", post(check_key))
        .route("/keys/check-all", post(check_all_keys))
        .route("/keys/check-many", post(check_many_keys))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            admin_auth_middleware,
        ))
        .with_state(state)
}

/// 创建公开 / 访客 API 路由（挂载在 `/api`）
///
/// - `GET /page-size` - 每页显示数量
/// - `GET /access-control` - 当前访问控制模式
/// - `POST /verify-guest` - 核验访客密码
/// - `GET /keys` - Key 列表（管理员或通过访问门禁）
pub fn create_public_router(state: AdminState) -> Router {
    Router::new()
        .route("/page-size", get(get_page_size))
        .route("/access-control", get(get_access_control))
        .route("/verify-guest", post(verify_guest))
        .route("/keys", get(list_keys))
        .with_state(state)
}
