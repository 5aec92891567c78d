//! 认证头解析与常量时间比较

use axum::http::{HeaderMap, header};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use subtle::ConstantTimeEq;

/// 读取 Authorization 头原始值
fn authorization(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
}

/// 去掉认证方案前缀（方案名大小写不敏感）
fn strip_scheme<'a>(value: &'a str, scheme: &str) -> Option<&'a str> {
    let (prefix, rest) = value.split_at_checked(scheme.len())?;
    if prefix.eq_ignore_ascii_case(scheme) {
        Some(rest)
    } else {
        None
    }
}

/// 提取 `Authorization: Bearer <token>` 中的 token
///
/// 缺少头或不是 Bearer 方案时返回 None
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = authorization(headers)?;
    let token = strip_scheme(value, "Bearer ")?.trim();
    Some(token.to_string())
}

/// Basic 认证凭据
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicCredentials {
    pub username: String,
    pub password: String,
}

/// 提取并解码 `Authorization: Basic <base64>`
pub fn extract_basic_credentials(headers: &HeaderMap) -> Option<BasicCredentials> {
    let value = authorization(headers)?;
    let encoded = strip_scheme(value, "Basic ")?.trim();
    let decoded = STANDARD.decode(encoded).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    // 密码中允许出现冒号，只按第一个冒号切分
    let (username, password) = decoded.split_once(':')?;
    Some(BasicCredentials {
        username: username.to_string(),
        password: password.to_string(),
    })
}

/// 常量时间字符串比较（防止时序攻击）
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}
