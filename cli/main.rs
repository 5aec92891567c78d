//! keypool-rs CLI Tool
//!
//! 命令行工具，离线管理 Key 文件和代理设置

mod commands;

use clap::{Parser, Subcommand};

use keypool_rs::model::config::Config;

#[derive(Parser)]
#[command(name = "keypool-cli")]
#[command(version, about = "keypool-rs 命令行工具", long_about = None)]
struct Cli {
    /// 配置文件路径
    #[arg(short, long, global = true, default_value = "config/config.json")]
    config: String,

    /// 数据目录（覆盖配置文件中的 dataDir）
    #[arg(short, long, global = true)]
    data_dir: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Key 管理
    #[command(subcommand)]
    Keys(KeysCommands),

    /// 代理设置
    #[command(subcommand)]
    Settings(SettingsCommands),
}

#[derive(Subcommand)]
enum KeysCommands {
    /// 列出所有 Key（按余额降序）
    List {
        /// 显示完整 Key
        #[arg(long)]
        reveal: bool,
    },

    /// 添加 Key
    Add {
        key: String,

        /// 初始余额
        #[arg(short, long, default_value = "0")]
        balance: f64,

        /// 添加后立即检测
        #[arg(long)]
        check: bool,
    },

    /// 从文件导入 Key
    Import {
        /// 导入文件路径
        #[arg(short, long)]
        input: String,

        /// 文件格式 (text/json/yaml)
        #[arg(long, default_value = "text")]
        format: String,

        /// 导入后立即检测
        #[arg(long)]
        check: bool,
    },

    /// 删除 Key
    Delete { key: String },

    /// 检测 Key（不指定则检测全部）
    Check { keys: Vec<String> },

    /// 导出 Key 记录
    Export {
        /// 导出文件路径
        #[arg(short, long)]
        output: String,

        /// 文件格式 (json/yaml)
        #[arg(long, default_value = "json")]
        format: String,
    },
}

#[derive(Subcommand)]
enum SettingsCommands {
    /// 显示当前设置
    Show,

    /// 修改设置
    Set {
        /// 设置项 (api_key/admin_username/admin_password/page_size/access_control/guest_password)
        name: String,
        value: String,
    },
}

#[tokio::main]
async fn main() {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("错误: 加载配置失败: {}", e);
            std::process::exit(1);
        }
    };
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = data_dir;
    }

    let result = match cli.command {
        Commands::Keys(cmd) => match cmd {
            KeysCommands::List { reveal } => commands::keys::list(&config, reveal).await,
            KeysCommands::Add {
                key,
                balance,
                check,
            } => commands::keys::add(&config, &key, balance, check).await,
            KeysCommands::Import {
                input,
                format,
                check,
            } => commands::keys::import(&config, &input, &format, check).await,
            KeysCommands::Delete { key } => commands::keys::delete(&config, &key).await,
            KeysCommands::Check { keys } => commands::keys::check(&config, &keys).await,
            KeysCommands::Export { output, format } => {
                commands::keys::export(&config, &output, &format).await
            }
        },
        Commands::Settings(cmd) => match cmd {
            SettingsCommands::Show => commands::settings::show(&config).await,
            SettingsCommands::Set { name, value } => {
                commands::settings::set(&config, &name, &value).await
            }
        },
    };

    if let Err(e) = result {
        eprintln!("错误: {}", e);
        std::process::exit(1);
    }
}
