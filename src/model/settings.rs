//! 代理运行时设置
//!
//! 保存在 ConfigStore 中，可通过 Admin API 在运行时修改，每次读取都实时生效。
//! 未设置（或为空字符串）的字段在读取时回退到默认值。

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::store::{ConfigStore, StoreError};

/// 配置项名称
pub mod names {
    pub const API_KEY: &str = "api_key";
    pub const ADMIN_USERNAME: &str = "admin_username";
    pub const ADMIN_PASSWORD: &str = "admin_password";
    pub const PAGE_SIZE: &str = "page_size";
    pub const ACCESS_CONTROL: &str = "access_control";
    pub const GUEST_PASSWORD: &str = "guest_password";

    pub const ALL: [&str; 6] = [
        API_KEY,
        ADMIN_USERNAME,
        ADMIN_PASSWORD,
        PAGE_SIZE,
        ACCESS_CONTROL,
        GUEST_PASSWORD,
    ];
}

pub const DEFAULT_API_KEY: &str = "default-api-key";
pub const DEFAULT_ADMIN_USERNAME: &str = "default-admin-username";
pub const DEFAULT_ADMIN_PASSWORD: &str = "default-admin-password";
pub const DEFAULT_PAGE_SIZE: u32 = 12;
pub const DEFAULT_GUEST_PASSWORD: &str = "guest_password";

/// 访问控制模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AccessControl {
    /// 完全开放
    #[default]
    Open,
    /// 部分开放：需要访客密码
    Restricted,
    /// 完全私有：仅管理员
    Private,
}

impl AccessControl {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessControl::Open => "open",
            AccessControl::Restricted => "restricted",
            AccessControl::Private => "private",
        }
    }
}

impl fmt::Display for AccessControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccessControl {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "open" => Ok(AccessControl::Open),
            "restricted" => Ok(AccessControl::Restricted),
            "private" => Ok(AccessControl::Private),
            other => Err(format!(
                "无效的访问控制模式: {}，应为 open、restricted 或 private",
                other
            )),
        }
    }
}

/// 解析后的完整设置
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxySettings {
    /// 客户端访问代理使用的共享 API Key
    pub api_key: String,
    pub admin_username: String,
    pub admin_password: String,
    /// 前端每页显示的 Key 数量
    pub page_size: u32,
    pub access_control: AccessControl,
    /// restricted 模式下的访客密码
    pub guest_password: String,
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            api_key: DEFAULT_API_KEY.to_string(),
            admin_username: DEFAULT_ADMIN_USERNAME.to_string(),
            admin_password: DEFAULT_ADMIN_PASSWORD.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            access_control: AccessControl::default(),
            guest_password: DEFAULT_GUEST_PASSWORD.to_string(),
        }
    }
}

/// 取非空值
fn non_empty(value: Option<&String>) -> Option<&str> {
    value.map(|v| v.as_str()).filter(|v| !v.trim().is_empty())
}

/// 解析页面大小，无效时回退默认值
fn parse_page_size(value: Option<&str>) -> u32 {
    value
        .and_then(|v| v.trim().parse::<u32>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(DEFAULT_PAGE_SIZE)
}

/// 解析访问控制模式
///
/// 存储中出现无法识别的值时按 private 处理（拒绝访客）
fn parse_access_control(value: Option<&str>) -> AccessControl {
    match value {
        None => AccessControl::default(),
        Some(raw) => raw.parse().unwrap_or_else(|e| {
            tracing::warn!("{}，按 private 处理", e);
            AccessControl::Private
        }),
    }
}

impl ProxySettings {
    /// 从原始配置映射解析（缺失字段使用默认值）
    pub fn from_map(map: &HashMap<String, String>) -> Self {
        let text = |name: &str, default: &str| {
            non_empty(map.get(name))
                .map(|v| v.to_string())
                .unwrap_or_else(|| default.to_string())
        };

        Self {
            api_key: text(names::API_KEY, DEFAULT_API_KEY),
            admin_username: text(names::ADMIN_USERNAME, DEFAULT_ADMIN_USERNAME),
            admin_password: text(names::ADMIN_PASSWORD, DEFAULT_ADMIN_PASSWORD),
            page_size: parse_page_size(non_empty(map.get(names::PAGE_SIZE))),
            access_control: parse_access_control(non_empty(map.get(names::ACCESS_CONTROL))),
            guest_password: text(names::GUEST_PASSWORD, DEFAULT_GUEST_PASSWORD),
        }
    }
}

/// 更新设置请求（只写入提供的字段）
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSettings {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub admin_username: Option<String>,
    #[serde(default)]
    pub admin_password: Option<String>,
    #[serde(default)]
    pub page_size: Option<u32>,
    #[serde(default)]
    pub access_control: Option<AccessControl>,
    #[serde(default)]
    pub guest_password: Option<String>,
}

impl UpdateSettings {
    /// 校验字段，返回全部错误
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        let text_fields = [
            ("apiKey", &self.api_key),
            ("adminUsername", &self.admin_username),
            ("adminPassword", &self.admin_password),
            ("guestPassword", &self.guest_password),
        ];
        for (field, value) in text_fields {
            if value.as_ref().is_some_and(|v| v.trim().is_empty()) {
                errors.push(format!("{} 不能为空", field));
            }
        }

        if self.admin_username.as_ref().is_some_and(|v| v.contains(':')) {
            errors.push("adminUsername 不能包含冒号".to_string());
        }

        if self.page_size == Some(0) {
            errors.push("pageSize 不能为 0".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// 由单个 name=value 构造（CLI 使用）
    pub fn from_pair(name: &str, value: &str) -> Result<Self, String> {
        let mut update = Self::default();
        match name {
            names::API_KEY => update.api_key = Some(value.to_string()),
            names::ADMIN_USERNAME => update.admin_username = Some(value.to_string()),
            names::ADMIN_PASSWORD => update.admin_password = Some(value.to_string()),
            names::PAGE_SIZE => {
                let page_size = value
                    .trim()
                    .parse::<u32>()
                    .map_err(|_| format!("page_size 必须是正整数: {}", value))?;
                update.page_size = Some(page_size);
            }
            names::ACCESS_CONTROL => update.access_control = Some(value.parse()?),
            names::GUEST_PASSWORD => update.guest_password = Some(value.to_string()),
            _ => {
                return Err(format!(
                    "未知的设置项: {}（可选: {}）",
                    name,
                    names::ALL.join(", ")
                ));
            }
        }
        Ok(update)
    }

    /// 是否没有任何字段
    pub fn is_empty(&self) -> bool {
        self.api_key.is_none()
            && self.admin_username.is_none()
            && self.admin_password.is_none()
            && self.page_size.is_none()
            && self.access_control.is_none()
            && self.guest_password.is_none()
    }

    /// 转换为存储用的 name -> value 映射
    pub fn into_values(self) -> HashMap<String, String> {
        let mut values = HashMap::new();
        if let Some(v) = self.api_key {
            values.insert(names::API_KEY.to_string(), v);
        }
        if let Some(v) = self.admin_username {
            values.insert(names::ADMIN_USERNAME.to_string(), v);
        }
        if let Some(v) = self.admin_password {
            values.insert(names::ADMIN_PASSWORD.to_string(), v);
        }
        if let Some(v) = self.page_size {
            values.insert(names::PAGE_SIZE.to_string(), v.to_string());
        }
        if let Some(v) = self.access_control {
            values.insert(names::ACCESS_CONTROL.to_string(), v.as_str().to_string());
        }
        if let Some(v) = self.guest_password {
            values.insert(names::GUEST_PASSWORD.to_string(), v);
        }
        values
    }
}

/// 设置服务：ConfigStore 之上的默认值回退层
///
/// 不做缓存，每次调用都读取存储
#[derive(Clone)]
pub struct SettingsService {
    store: Arc<dyn ConfigStore>,
}

impl SettingsService {
    pub fn new(store: Arc<dyn ConfigStore>) -> Self {
        Self { store }
    }

    /// 读取完整设置
    pub fn settings(&self) -> Result<ProxySettings, StoreError> {
        let map = self.store.get_all()?;
        Ok(ProxySettings::from_map(&map))
    }

    /// 读取共享 API Key
    pub fn api_key(&self) -> Result<String, StoreError> {
        Ok(self
            .store
            .get(names::API_KEY)?
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_API_KEY.to_string()))
    }

    /// 读取页面大小
    pub fn page_size(&self) -> Result<u32, StoreError> {
        let value = self.store.get(names::PAGE_SIZE)?;
        Ok(parse_page_size(non_empty(value.as_ref())))
    }

    /// 读取访问控制模式
    pub fn access_control(&self) -> Result<AccessControl, StoreError> {
        let value = self.store.get(names::ACCESS_CONTROL)?;
        Ok(parse_access_control(non_empty(value.as_ref())))
    }

    /// 按名称读取单个设置（已应用默认值），未知名称返回 None
    pub fn value(&self, name: &str) -> Result<Option<String>, StoreError> {
        let settings = self.settings()?;
        let value = match name {
            names::API_KEY => settings.api_key,
            names::ADMIN_USERNAME => settings.admin_username,
            names::ADMIN_PASSWORD => settings.admin_password,
            names::PAGE_SIZE => settings.page_size.to_string(),
            names::ACCESS_CONTROL => settings.access_control.to_string(),
            names::GUEST_PASSWORD => settings.guest_password,
            _ => return Ok(None),
        };
        Ok(Some(value))
    }

    /// 写入提供的字段（调用方负责先 validate）
    pub fn update(&self, update: UpdateSettings) -> Result<(), StoreError> {
        let values = update.into_values();
        if values.is_empty() {
            return Ok(());
        }
        let mut changed: Vec<&str> = values.keys().map(|k| k.as_str()).collect();
        changed.sort_unstable();
        tracing::info!("更新代理设置: {}", changed.join(", "));
        self.store.set_many(values)
    }
}
