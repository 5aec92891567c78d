//! 访问门禁
//!
//! 决定调用方能否访问访客级接口（如 Key 列表）：
//! - open: 直接放行
//! - restricted: 需要 `Authorization: Bearer <访客密码>`
//! - private: 需要管理员 Basic 认证
//!
//! 模式每次请求都从存储实时读取

use axum::http::HeaderMap;

use crate::common::auth::{constant_time_eq, extract_basic_credentials, extract_bearer_token};
use crate::error::ProxyError;
use crate::model::settings::{AccessControl, ProxySettings, SettingsService};

/// 访客核验结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuestVerification {
    /// 密码正确，返回访客 token
    Granted(String),
    /// 密码错误
    Denied,
    /// 当前模式不使用访客密码
    NotRequired(AccessControl),
}

#[derive(Clone)]
pub struct AccessGate {
    settings: SettingsService,
}

impl AccessGate {
    pub fn new(settings: SettingsService) -> Self {
        Self { settings }
    }

    /// 管理员 Basic 认证
    pub fn check_admin(&self, headers: &HeaderMap) -> Result<(), ProxyError> {
        let settings = self.settings.settings()?;
        if is_admin(&settings, headers) {
            Ok(())
        } else {
            Err(ProxyError::unauthenticated())
        }
    }

    /// 访客级访问检查
    pub fn check_guest(&self, headers: &HeaderMap) -> Result<(), ProxyError> {
        let settings = self.settings.settings()?;
        let allowed = match settings.access_control {
            AccessControl::Open => true,
            AccessControl::Private => is_admin(&settings, headers),
            AccessControl::Restricted => extract_bearer_token(headers)
                .is_some_and(|token| constant_time_eq(&token, &settings.guest_password)),
        };

        if allowed {
            Ok(())
        } else {
            tracing::debug!("访问门禁拒绝 (mode={})", settings.access_control);
            Err(ProxyError::access_denied(settings.access_control))
        }
    }

    /// 管理员或门禁任一通过即可
    pub fn check_admin_or_guest(&self, headers: &HeaderMap) -> Result<(), ProxyError> {
        let settings = self.settings.settings()?;
        if is_admin(&settings, headers) {
            return Ok(());
        }
        self.check_guest(headers)
    }

    /// 核验访客密码
    pub fn verify_guest(&self, password: &str) -> Result<GuestVerification, ProxyError> {
        let settings = self.settings.settings()?;
        if settings.access_control != AccessControl::Restricted {
            return Ok(GuestVerification::NotRequired(settings.access_control));
        }
        if constant_time_eq(password, &settings.guest_password) {
            Ok(GuestVerification::Granted(settings.guest_password))
        } else {
            Ok(GuestVerification::Denied)
        }
    }
}

fn is_admin(settings: &ProxySettings, headers: &HeaderMap) -> bool {
    extract_basic_credentials(headers).is_some_and(|credentials| {
        // 两项都要比较，避免用户名错误时提前返回
        let username_ok = constant_time_eq(&credentials.username, &settings.admin_username);
        let password_ok = constant_time_eq(&credentials.password, &settings.admin_password);
        username_ok & password_ok
    })
}
