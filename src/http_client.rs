//! HTTP 客户端构建

use std::time::Duration;

use reqwest::{Client, ClientBuilder, Proxy, redirect};

/// 上游跟随重定向的最大次数
const MAX_REDIRECTS: usize = 10;

/// 出站 HTTP 代理配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    /// 代理地址（http/https/socks5）
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl ProxyConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            username: None,
            password: None,
        }
    }

    /// 设置代理认证
    pub fn with_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }
}

/// 构建 reqwest 客户端
///
/// - `timeout_secs`: 单次请求总超时（含读取响应体）
/// - 自动跟随重定向（最多 10 次）
pub fn build_client(proxy: Option<&ProxyConfig>, timeout_secs: u64) -> anyhow::Result<Client> {
    let builder = base_builder(proxy)?
        .timeout(Duration::from_secs(timeout_secs))
        .connect_timeout(Duration::from_secs(timeout_secs.min(10)));
    Ok(builder.build()?)
}

/// 构建转发用客户端
///
/// 不设总超时，流式响应可以持续任意时长；
/// `idle_timeout_secs` 限制两次读取之间的最长间隔
pub fn build_forward_client(
    proxy: Option<&ProxyConfig>,
    idle_timeout_secs: u64,
) -> anyhow::Result<Client> {
    let builder = base_builder(proxy)?
        .read_timeout(Duration::from_secs(idle_timeout_secs))
        .connect_timeout(Duration::from_secs(idle_timeout_secs.min(10)));
    Ok(builder.build()?)
}

fn base_builder(proxy: Option<&ProxyConfig>) -> anyhow::Result<ClientBuilder> {
    let mut builder = Client::builder().redirect(redirect::Policy::limited(MAX_REDIRECTS));

    if let Some(proxy_config) = proxy {
        let mut proxy = Proxy::all(&proxy_config.url)?;
        if let (Some(username), Some(password)) = (&proxy_config.username, &proxy_config.password)
        {
            proxy = proxy.basic_auth(username, password);
        }
        builder = builder.proxy(proxy);
    }

    Ok(builder)
}
