//! Admin / 访客 API 模块
//!
//! # 功能
//! - 设置管理（读取/更新）
//! - Key 管理（添加、批量添加、删除）
//! - Key 检测（单个、全部、指定列表）
//! - 公开信息与访客认证
//!
//! # 使用
//! ```ignore
//! let admin_state = AdminState::new(pool.clone(), settings.clone());
//! let router = Router::new()
//!     .nest("/api/admin", create_admin_router(admin_state.clone()))
//!     .nest("/api", create_public_router(admin_state));
//! ```

mod config_handlers;
mod guest_handlers;
mod handlers;
mod middleware;
mod router;
pub mod types;

pub use middleware::AdminState;
pub use router::{create_admin_router, create_public_router};
