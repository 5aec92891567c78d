use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::http_client::ProxyConfig;

/// 存储后端
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum StoreBackend {
    /// JSON 文件（keys.json / settings.json）
    #[default]
    File,
    /// 进程内存（重启丢失）
    Memory,
}

/// 服务配置
///
/// 启动时从 config/config.json 读取，修改后需重启生效；
/// 共享 API Key、管理员账号等运行时设置见 [`super::settings`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// 上游 API 地址（不含路径）
    #[serde(default = "default_upstream_base_url")]
    pub upstream_base_url: String,

    /// 转发连接超时与读取间隔超时（秒），不限制流式响应总时长
    #[serde(default = "default_upstream_timeout_secs")]
    pub upstream_timeout_secs: u64,

    /// Key 检测请求超时（秒）
    #[serde(default = "default_validation_timeout_secs")]
    pub validation_timeout_secs: u64,

    /// Key 检测使用的模型
    #[serde(default = "default_probe_model")]
    pub probe_model: String,

    /// Key 检测请求的 max_tokens
    #[serde(default = "default_probe_max_tokens")]
    pub probe_max_tokens: u32,

    /// 批量检测每批数量（默认 10）
    #[serde(default = "default_validation_batch_size")]
    pub validation_batch_size: usize,

    /// 批量检测批次间隔（毫秒，默认 1000）
    #[serde(default = "default_validation_batch_delay_ms")]
    pub validation_batch_delay_ms: u64,

    /// 定时检测全部 Key 的间隔（秒，0 表示关闭）
    #[serde(default)]
    pub auto_check_interval_secs: u64,

    /// 存储后端
    #[serde(default)]
    pub store_backend: StoreBackend,

    /// 数据目录（file 后端存放 keys.json / settings.json）
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// HTTP 代理地址（可选）
    /// 支持格式: http://host:port, https://host:port, socks5://host:port
    #[serde(default)]
    pub proxy_url: Option<String>,

    /// 代理认证用户名（可选）
    #[serde(default)]
    pub proxy_username: Option<String>,

    /// 代理认证密码（可选）
    #[serde(default)]
    pub proxy_password: Option<String>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_upstream_base_url() -> String {
    "https://api.siliconflow.cn".to_string()
}

fn default_upstream_timeout_secs() -> u64 {
    30
}

fn default_validation_timeout_secs() -> u64 {
    10
}

fn default_probe_model() -> String {
    "Qwen/Qwen2.5-7B-Instruct".to_string()
}

fn default_probe_max_tokens() -> u32 {
    100
}

fn default_validation_batch_size() -> usize {
    10
}

fn default_validation_batch_delay_ms() -> u64 {
    1000
}

fn default_data_dir() -> String {
    "data".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            upstream_base_url: default_upstream_base_url(),
            upstream_timeout_secs: default_upstream_timeout_secs(),
            validation_timeout_secs: default_validation_timeout_secs(),
            probe_model: default_probe_model(),
            probe_max_tokens: default_probe_max_tokens(),
            validation_batch_size: default_validation_batch_size(),
            validation_batch_delay_ms: default_validation_batch_delay_ms(),
            auto_check_interval_secs: 0,
            store_backend: StoreBackend::default(),
            data_dir: default_data_dir(),
            proxy_url: None,
            proxy_username: None,
            proxy_password: None,
        }
    }
}

impl Config {
    /// 获取默认配置文件路径
    pub fn default_config_path() -> &'static str {
        "config/config.json"
    }

    /// 从文件加载配置
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            // 配置文件不存在，返回默认配置
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// 保存配置到文件
    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Key 存储文件路径
    pub fn keys_path(&self) -> PathBuf {
        Path::new(&self.data_dir).join("keys.json")
    }

    /// 设置存储文件路径
    pub fn settings_path(&self) -> PathBuf {
        Path::new(&self.data_dir).join("settings.json")
    }

    /// 上游地址（去掉末尾斜杠）
    pub fn upstream_base(&self) -> &str {
        self.upstream_base_url.trim_end_matches('/')
    }

    /// 出站代理配置（未配置 proxyUrl 时为 None）
    pub fn proxy(&self) -> Option<ProxyConfig> {
        let url = self.proxy_url.as_deref().filter(|u| !u.trim().is_empty())?;
        let proxy = ProxyConfig::new(url);
        Some(match (&self.proxy_username, &self.proxy_password) {
            (Some(username), Some(password)) => proxy.with_auth(username, password),
            _ => proxy,
        })
    }

    /// 验证配置有效性
    ///
    /// 检查必填字段和格式是否正确
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        // 检查 host
        if self.host.trim().is_empty() {
            errors.push("host 不能为空".to_string());
        }

        // 检查 port
        if self.port == 0 {
            errors.push("port 不能为 0".to_string());
        }

        // 检查上游地址
        if !self.upstream_base_url.starts_with("http://")
            && !self.upstream_base_url.starts_with("https://")
        {
            errors.push(format!(
                "upstreamBaseUrl 格式不正确: {}，应以 http:// 或 https:// 开头",
                self.upstream_base_url
            ));
        }

        // 检查超时
        if self.upstream_timeout_secs == 0 {
            errors.push("upstreamTimeoutSecs 不能为 0".to_string());
        }
        if self.validation_timeout_secs == 0 {
            errors.push("validationTimeoutSecs 不能为 0".to_string());
        }

        // 检查检测参数
        if self.probe_model.trim().is_empty() {
            errors.push("probeModel 不能为空".to_string());
        }
        if self.probe_max_tokens == 0 {
            errors.push("probeMaxTokens 不能为 0".to_string());
        }
        if self.validation_batch_size == 0 {
            errors.push("validationBatchSize 不能为 0".to_string());
        }

        if self.store_backend == StoreBackend::File && self.data_dir.trim().is_empty() {
            errors.push("dataDir 不能为空".to_string());
        }

        // 检查代理 URL 格式
        if let Some(ref proxy_url) = self.proxy_url {
            if !proxy_url.is_empty()
                && !proxy_url.starts_with("http://")
                && !proxy_url.starts_with("https://")
                && !proxy_url.starts_with("socks5://")
            {
                errors.push(format!(
                    "proxyUrl 格式不正确: {}，应以 http://、https:// 或 socks5:// 开头",
                    proxy_url
                ));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.validation_batch_size, 10);
        assert_eq!(config.validation_batch_delay_ms, 1000);
    }

    #[test]
    fn test_load_missing_file_returns_default() {
        let dir = tempdir().unwrap();
        let config = Config::load(dir.path().join("missing.json")).unwrap();
        assert_eq!(config.port, 3000);
        assert_eq!(config.store_backend, StoreBackend::File);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{"port": 8081, "storeBackend": "memory", "upstreamBaseUrl": "http://127.0.0.1:9000/"}"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.port, 8081);
        assert_eq!(config.store_backend, StoreBackend::Memory);
        assert_eq!(config.upstream_base(), "http://127.0.0.1:9000");
        assert_eq!(config.probe_max_tokens, 100);
    }

    #[test]
    fn test_validate_collects_errors() {
        let config = Config {
            port: 0,
            upstream_base_url: "ftp://example.com".to_string(),
            validation_batch_size: 0,
            proxy_url: Some("127.0.0.1:1080".to_string()),
            ..Config::default()
        };
        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 4);
    }

    #[test]
    fn test_proxy_config() {
        assert!(Config::default().proxy().is_none());

        let config = Config {
            proxy_url: Some("socks5://127.0.0.1:1080".to_string()),
            proxy_username: Some("u".to_string()),
            proxy_password: Some("p".to_string()),
            ..Config::default()
        };
        let proxy = config.proxy().unwrap();
        assert_eq!(proxy.url, "socks5://127.0.0.1:1080");
        assert_eq!(proxy.password.as_deref(), Some("p"));

        let empty = Config {
            proxy_url: Some(String::new()),
            ..Config::default()
        };
        assert!(empty.proxy().is_none());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        let config = Config {
            auto_check_interval_secs: 600,
            ..Config::default()
        };
        config.save(&path).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("\"autoCheckIntervalSecs\": 600"));
        assert_eq!(Config::load(&path).unwrap().auto_check_interval_secs, 600);
    }
}
