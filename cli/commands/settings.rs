//! 代理设置命令

use anyhow::{Context, Result};
use std::sync::Arc;

use keypool_rs::model::config::Config;
use keypool_rs::model::settings::{SettingsService, UpdateSettings, names};
use keypool_rs::store::JsonSettingsStore;

fn open_settings(config: &Config) -> Result<SettingsService> {
    let path = config.settings_path();
    let store = JsonSettingsStore::open(&path)
        .with_context(|| format!("打开设置文件失败: {}", path.display()))?;
    Ok(SettingsService::new(Arc::new(store)))
}

/// 显示当前设置（已应用默认值）
pub async fn show(config: &Config) -> Result<()> {
    let service = open_settings(config)?;
    println!("设置文件: {}\n", config.settings_path().display());
    for name in names::ALL {
        let value = service.value(name)?.unwrap_or_default();
        println!("{:<16} {}", name, value);
    }
    Ok(())
}

/// 修改单个设置
pub async fn set(config: &Config, name: &str, value: &str) -> Result<()> {
    let update = UpdateSettings::from_pair(name, value).map_err(anyhow::Error::msg)?;
    if let Err(errors) = update.validate() {
        anyhow::bail!("设置无效: {}", errors.join("; "));
    }

    let service = open_settings(config)?;
    service.update(update)?;
    println!("已更新 {} = {}", name, service.value(name)?.unwrap_or_default());
    Ok(())
}
