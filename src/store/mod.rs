//! 存储抽象
//!
//! Key 记录和代理设置的持久化接口，核心逻辑只依赖这里的 trait，
//! 具体实现见 [`memory`]（进程内）和 [`json_file`]（JSON 文件）

mod error;
pub mod json_file;
pub mod memory;

pub use error::StoreError;
pub use json_file::{JsonKeyStore, JsonSettingsStore};
pub use memory::{MemoryKeyStore, MemorySettingsStore};

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 单个上游 Key 的记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyRecord {
    /// 上游 API Key（池内唯一）
    pub key: String,
    /// 剩余余额，0 表示不参与负载均衡
    #[serde(default)]
    pub balance: f64,
    /// 添加时间
    pub added: DateTime<Utc>,
    /// 最近一次检测时间（从未检测时为 None）
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
    /// 最近一次检测失败的原因（最近一次检测成功时为 None）
    #[serde(default)]
    pub last_error: Option<String>,
}

impl KeyRecord {
    /// 创建新记录
    pub fn new(key: impl Into<String>, balance: f64) -> Self {
        Self {
            key: key.into(),
            balance: sanitize_balance(balance),
            added: Utc::now(),
            last_updated: None,
            last_error: None,
        }
    }

    /// 是否可被选中（余额 > 0）
    pub fn is_eligible(&self) -> bool {
        self.balance > 0.0
    }
}

/// 余额规整：负数、NaN、无穷大一律视为 0
pub fn sanitize_balance(balance: f64) -> f64 {
    if balance.is_finite() && balance > 0.0 {
        balance
    } else {
        0.0
    }
}

/// 按余额降序排列（余额相同按 Key 排序，保证输出稳定）
pub(crate) fn sort_records(records: &mut [KeyRecord]) {
    records.sort_by(|a, b| {
        b.balance
            .total_cmp(&a.balance)
            .then_with(|| a.key.cmp(&b.key))
    });
}

/// Key 记录存储
///
/// 每条记录的更新相互独立，不提供跨记录事务
pub trait KeyStore: Send + Sync {
    /// 列出全部记录（按余额降序）
    fn list(&self) -> Result<Vec<KeyRecord>, StoreError>;

    /// 按 Key 查找
    fn get(&self, key: &str) -> Result<Option<KeyRecord>, StoreError>;

    /// 添加或覆盖单个 Key（已存在时整条记录重置）
    fn upsert(&self, key: &str, balance: f64) -> Result<(), StoreError>;

    /// 批量添加或覆盖
    fn upsert_many(&self, keys: &[String], balance: f64) -> Result<(), StoreError>;

    /// 删除 Key，返回是否存在
    fn delete(&self, key: &str) -> Result<bool, StoreError>;

    /// 写入检测结果，返回记录是否存在
    fn update(
        &self,
        key: &str,
        balance: f64,
        last_updated: DateTime<Utc>,
        last_error: Option<String>,
    ) -> Result<bool, StoreError>;
}

/// 命名配置项存储
pub trait ConfigStore: Send + Sync {
    /// 读取单个配置项
    fn get(&self, name: &str) -> Result<Option<String>, StoreError>;

    /// 读取全部配置项
    fn get_all(&self) -> Result<HashMap<String, String>, StoreError>;

    /// 批量覆盖写入
    fn set_many(&self, values: HashMap<String, String>) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_balance() {
        assert_eq!(sanitize_balance(12.5), 12.5);
        assert_eq!(sanitize_balance(-1.0), 0.0);
        assert_eq!(sanitize_balance(f64::NAN), 0.0);
        assert_eq!(sanitize_balance(f64::INFINITY), 0.0);
    }

    #[test]
    fn test_sort_records_balance_desc() {
        let mut records = vec![
            KeyRecord::new("b", 1.0),
            KeyRecord::new("a", 5.0),
            KeyRecord::new("c", 1.0),
        ];
        sort_records(&mut records);
        let keys: Vec<_> = records.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_key_record_serialization() {
        let record = KeyRecord::new("sk-test", 3.0);
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"lastUpdated\":null"));
        assert!(json.contains("\"lastError\":null"));

        let parsed: KeyRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, record);
        assert!(parsed.is_eligible());
    }
}
