//! Key 管理命令

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use keypool_rs::build_pool;
use keypool_rs::common::mask_key;
use keypool_rs::model::config::Config;
use keypool_rs::pool::{BatchOutcome, CheckStatus, KeyPool};
use keypool_rs::store::{JsonKeyStore, KeyRecord};

/// 导入文件中的一项：纯字符串或导出的 Key 记录
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ImportedKey {
    Plain(String),
    Record { key: String },
}

impl ImportedKey {
    fn into_key(self) -> String {
        match self {
            ImportedKey::Plain(key) | ImportedKey::Record { key } => key,
        }
    }
}

/// 解析导入文件内容
///
/// - `text`: 每行一个 Key
/// - `json` / `yaml`: 字符串数组，或 `keys export` 导出的记录数组
fn parse_import(content: &str, format: &str) -> Result<Vec<String>> {
    let keys = match format {
        "text" | "txt" => content.lines().map(|l| l.to_string()).collect(),
        "json" => serde_json::from_str::<Vec<ImportedKey>>(content)
            .context("解析 JSON 文件失败")?
            .into_iter()
            .map(ImportedKey::into_key)
            .collect(),
        "yaml" | "yml" => serde_yaml::from_str::<Vec<ImportedKey>>(content)
            .context("解析 YAML 文件失败")?
            .into_iter()
            .map(ImportedKey::into_key)
            .collect(),
        _ => anyhow::bail!("不支持的格式: {}，支持 text、json 或 yaml", format),
    };
    Ok(keys)
}

fn open_pool(config: &Config) -> Result<KeyPool> {
    let path = config.keys_path();
    let store = JsonKeyStore::open(&path)
        .with_context(|| format!("打开 Key 文件失败: {}", path.display()))?;
    build_pool(config, Arc::new(store))
}

fn print_record(record: &KeyRecord, reveal: bool) {
    let key = if reveal {
        record.key.clone()
    } else {
        mask_key(&record.key)
    };
    println!("{}", key);
    println!("  余额: {}", record.balance);
    println!("  添加时间: {}", record.added.format("%Y-%m-%d %H:%M:%S"));
    match record.last_updated {
        Some(at) => println!("  最近检测: {}", at.format("%Y-%m-%d %H:%M:%S")),
        None => println!("  最近检测: 从未检测"),
    }
    if let Some(ref error) = record.last_error {
        println!("  最近错误: {}", error);
    }
}

fn print_outcome(outcome: &BatchOutcome) {
    for item in &outcome.results {
        let mark = match item.status {
            CheckStatus::Valid => "✅",
            CheckStatus::Invalid => "❌",
            CheckStatus::NotFound => "❓",
            CheckStatus::StoreFailed => "⚠️ ",
        };
        println!(
            "{} {}  余额: {}  {}",
            mark,
            mask_key(&item.key),
            item.balance,
            item.message
        );
    }
    println!(
        "\n检测完成: 共 {}，通过 {}，失败 {}",
        outcome.total, outcome.updated, outcome.failed
    );
}

/// 列出所有 Key
pub async fn list(config: &Config, reveal: bool) -> Result<()> {
    let pool = open_pool(config)?;
    let records = pool.list()?;

    if records.is_empty() {
        println!("没有找到 Key");
        println!("使用 'keys add' 或 'keys import' 命令添加 Key");
        return Ok(());
    }

    let stats = pool.stats()?;
    println!(
        "共 {} 个 Key，可用 {} 个，可用余额 {}:\n",
        stats.total, stats.eligible, stats.total_balance
    );
    for record in &records {
        print_record(record, reveal);
        println!();
    }
    Ok(())
}

/// 添加单个 Key
pub async fn add(config: &Config, key: &str, balance: f64, check: bool) -> Result<()> {
    let pool = open_pool(config)?;
    pool.add_key(key, balance)?;
    println!("已添加 Key: {}", mask_key(key.trim()));

    if check {
        let outcome = pool.validate_one(key.trim()).await?;
        if outcome.is_valid {
            println!("检测通过，余额: {}", outcome.balance);
        } else {
            println!("检测未通过: {}", outcome.message);
        }
    }
    Ok(())
}

/// 从文件批量导入 Key
pub async fn import(config: &Config, input: &str, format: &str, check: bool) -> Result<()> {
    let input_path = Path::new(input);
    if !input_path.exists() {
        anyhow::bail!("导入文件不存在: {}", input);
    }

    let content = fs::read_to_string(input_path)
        .with_context(|| format!("读取导入文件失败: {}", input))?;
    let keys = parse_import(&content, format)?;
    if keys.iter().all(|k| k.trim().is_empty()) {
        println!("导入文件中没有 Key");
        return Ok(());
    }

    let pool = open_pool(config)?;
    let added = pool.add_keys(&keys)?;
    println!("导入成功! 共导入 {} 个 Key", added.len());

    if check {
        println!("开始检测导入的 Key...\n");
        let outcome = pool.validate_many(&added).await?;
        print_outcome(&outcome);
    }
    Ok(())
}

/// 删除 Key
pub async fn delete(config: &Config, key: &str) -> Result<()> {
    let pool = open_pool(config)?;
    pool.delete_key(key.trim())?;
    println!("已删除 Key: {}", mask_key(key.trim()));
    Ok(())
}

/// 检测 Key（未指定时检测全部）
pub async fn check(config: &Config, keys: &[String]) -> Result<()> {
    let pool = open_pool(config)?;
    let outcome = if keys.is_empty() {
        println!("检测全部 Key...\n");
        pool.validate_all().await?
    } else {
        pool.validate_many(keys).await?
    };
    print_outcome(&outcome);
    Ok(())
}

/// 导出 Key 记录
pub async fn export(config: &Config, output: &str, format: &str) -> Result<()> {
    let pool = open_pool(config)?;
    let records = pool.list()?;

    if records.is_empty() {
        println!("没有 Key 可导出");
        return Ok(());
    }

    let content = match format {
        "json" => serde_json::to_string_pretty(&records).context("序列化为 JSON 失败")?,
        "yaml" | "yml" => serde_yaml::to_string(&records).context("序列化为 YAML 失败")?,
        _ => anyhow::bail!("不支持的格式: {}，支持 json 或 yaml", format),
    };

    let output_path = Path::new(output);
    if let Some(parent) = output_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("创建输出目录失败: {:?}", parent))?;
    }
    fs::write(output_path, content)
        .with_context(|| format!("写入导出文件失败: {}", output))?;

    println!("导出成功! 共导出 {} 个 Key", records.len());
    println!("导出文件: {}", output);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_import_text() {
        let keys = parse_import("sk-1\n\nsk-2\n", "text").unwrap();
        assert_eq!(keys, vec!["sk-1", "", "sk-2"]);
    }

    #[test]
    fn test_parse_import_json_accepts_strings_and_records() {
        let keys = parse_import(
            r#"["sk-1", {"key": "sk-2", "balance": 3.5, "added": "2024-01-01T00:00:00Z"}]"#,
            "json",
        )
        .unwrap();
        assert_eq!(keys, vec!["sk-1", "sk-2"]);
    }

    #[test]
    fn test_parse_import_yaml() {
        let keys = parse_import("- sk-1\n- key: sk-2\n", "yaml").unwrap();
        assert_eq!(keys, vec!["sk-1", "sk-2"]);
    }

    #[test]
    fn test_parse_import_rejects_unknown_format() {
        assert!(parse_import("sk-1", "csv").is_err());
    }
}
