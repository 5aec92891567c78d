use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use keypool_rs::model::arg::Args;
use keypool_rs::model::config::{Config, StoreBackend};
use keypool_rs::model::settings::SettingsService;
use keypool_rs::store::{
    ConfigStore, JsonKeyStore, JsonSettingsStore, KeyStore, MemoryKeyStore, MemorySettingsStore,
};
use keypool_rs::{build_app, build_pool, health, http_client};

/// 按配置打开存储
fn open_stores(config: &Config) -> anyhow::Result<(Arc<dyn KeyStore>, Arc<dyn ConfigStore>)> {
    match config.store_backend {
        StoreBackend::File => {
            let keys = JsonKeyStore::open(config.keys_path())?;
            let settings = JsonSettingsStore::open(config.settings_path())?;
            tracing::info!(
                "使用文件存储: keys={}, settings={}",
                keys.path().display(),
                settings.path().display()
            );
            Ok((Arc::new(keys), Arc::new(settings)))
        }
        StoreBackend::Memory => {
            tracing::warn!("使用内存存储，重启后数据将丢失");
            Ok((
                Arc::new(MemoryKeyStore::new()),
                Arc::new(MemorySettingsStore::new()),
            ))
        }
    }
}

#[tokio::main]
async fn main() {
    // 解析命令行参数
    let args = Args::parse();

    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // 加载配置
    let config_path = args
        .config
        .unwrap_or_else(|| Config::default_config_path().to_string());
    let mut config = Config::load(&config_path).unwrap_or_else(|e| {
        tracing::error!("加载配置失败: {}", e);
        std::process::exit(1);
    });

    // 配置文件不存在时写出默认配置，便于修改
    if !Path::new(&config_path).exists() {
        if let Some(dir) = Path::new(&config_path).parent() {
            if let Err(e) = std::fs::create_dir_all(dir) {
                tracing::warn!("创建配置目录失败: {}", e);
            }
        }
        match config.save(&config_path) {
            Ok(()) => tracing::info!("已生成默认配置: {}", config_path),
            Err(e) => tracing::warn!("写入默认配置失败: {}", e),
        }
    }

    if let Some(data_dir) = args.data_dir {
        config.data_dir = data_dir;
    }

    // 验证配置
    if let Err(errors) = config.validate() {
        tracing::error!("配置验证失败:");
        for error in &errors {
            tracing::error!("  - {}", error);
        }
        std::process::exit(1);
    }

    let (key_store, config_store) = open_stores(&config).unwrap_or_else(|e| {
        tracing::error!("打开存储失败: {}", e);
        std::process::exit(1);
    });

    if let Some(url) = &config.proxy_url {
        if !url.trim().is_empty() {
            tracing::info!("已配置出站代理: {}", url);
        }
    }

    // 转发用客户端（仅连接与读取间隔超时）
    let client =
        http_client::build_forward_client(config.proxy().as_ref(), config.upstream_timeout_secs)
            .unwrap_or_else(|e| {
                tracing::error!("创建 HTTP 客户端失败: {}", e);
                std::process::exit(1);
            });

    let pool = build_pool(&config, key_store).unwrap_or_else(|e| {
        tracing::error!("创建 Key 池失败: {}", e);
        std::process::exit(1);
    });
    let pool = Arc::new(pool);
    let settings = SettingsService::new(config_store);

    match pool.stats() {
        Ok(stats) => tracing::info!(
            "已加载 {} 个 Key，可用 {} 个，可用余额 {}",
            stats.total,
            stats.eligible,
            stats.total_balance
        ),
        Err(e) => tracing::warn!("读取 Key 统计失败: {}", e),
    }

    if config.auto_check_interval_secs > 0 {
        health::start_auto_check_task(pool.clone(), config.auto_check_interval_secs);
        tracing::info!("定期检测已启用: 每 {} 秒", config.auto_check_interval_secs);
    }

    let app = build_app(pool, settings, client, config.upstream_base());

    // 启动服务器
    let addr = format!("{}:{}", config.host, config.port);
    tracing::info!("启动服务: {}", addr);
    tracing::info!("上游地址: {}", config.upstream_base());
    tracing::info!("可用 API:");
    tracing::info!("  ANY  /v1/*  (Authorization: Bearer <共享 API Key>)");
    tracing::info!("  GET  /health");
    tracing::info!("  GET  /api/page-size");
    tracing::info!("  GET  /api/access-control");
    tracing::info!("  POST /api/verify-guest");
    tracing::info!("  GET  /api/keys");
    tracing::info!("Admin API (Basic 认证):");
    tracing::info!("  GET  /api/admin/config");
    tracing::info!("  PUT  /api/admin/config");
    tracing::info!("  POST /api/admin/keys");
    tracing::info!("  POST /api/admin/keys/bulk");
    tracing::info!("  DELETE /api/admin/keys");
    tracing::info!("  POST /api/admin/keys/check");
    tracing::info!("  POST /api/admin/keys/check-all");
    tracing::info!("  POST /api/admin/keys/check-many");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("绑定地址 {} 失败: {}", addr, e);
            std::process::exit(1);
        });
    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("服务异常退出: {}", e);
        std::process::exit(1);
    }
}
