//! 进程内存储实现
//!
//! 重启即丢失，用于 `storeBackend = "memory"` 和测试

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;

use super::{ConfigStore, KeyRecord, KeyStore, StoreError, sanitize_balance, sort_records};

/// 内存 Key 存储
#[derive(Default)]
pub struct MemoryKeyStore {
    records: DashMap<String, KeyRecord>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 用已有记录初始化
    pub fn with_records(records: impl IntoIterator<Item = KeyRecord>) -> Self {
        let store = Self::new();
        for record in records {
            store.records.insert(record.key.clone(), record);
        }
        store
    }
}

impl KeyStore for MemoryKeyStore {
    fn list(&self) -> Result<Vec<KeyRecord>, StoreError> {
        let mut records: Vec<KeyRecord> =
            self.records.iter().map(|entry| entry.value().clone()).collect();
        sort_records(&mut records);
        Ok(records)
    }

    fn get(&self, key: &str) -> Result<Option<KeyRecord>, StoreError> {
        Ok(self.records.get(key).map(|entry| entry.value().clone()))
    }

    fn upsert(&self, key: &str, balance: f64) -> Result<(), StoreError> {
        self.records
            .insert(key.to_string(), KeyRecord::new(key, balance));
        Ok(())
    }

    fn upsert_many(&self, keys: &[String], balance: f64) -> Result<(), StoreError> {
        for key in keys {
            self.records
                .insert(key.clone(), KeyRecord::new(key.as_str(), balance));
        }
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.records.remove(key).is_some())
    }

    fn update(
        &self,
        key: &str,
        balance: f64,
        last_updated: DateTime<Utc>,
        last_error: Option<String>,
    ) -> Result<bool, StoreError> {
        match self.records.get_mut(key) {
            Some(mut entry) => {
                let record = entry.value_mut();
                record.balance = sanitize_balance(balance);
                record.last_updated = Some(last_updated);
                record.last_error = last_error;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// 内存配置存储
#[derive(Default)]
pub struct MemorySettingsStore {
    values: RwLock<HashMap<String, String>>,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConfigStore for MemorySettingsStore {
    fn get(&self, name: &str) -> Result<Option<String>, StoreError> {
        Ok(self.values.read().get(name).cloned())
    }

    fn get_all(&self) -> Result<HashMap<String, String>, StoreError> {
        Ok(self.values.read().clone())
    }

    fn set_many(&self, values: HashMap<String, String>) -> Result<(), StoreError> {
        self.values.write().extend(values);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upsert_resets_existing_record() {
        let store = MemoryKeyStore::new();
        store.upsert("sk-a", 5.0).unwrap();
        store
            .update("sk-a", 0.0, Utc::now(), Some("quota".to_string()))
            .unwrap();

        store.upsert("sk-a", 2.0).unwrap();

        let records = store.list().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].balance, 2.0);
        assert!(records[0].last_updated.is_none());
        assert!(records[0].last_error.is_none());
    }

    #[test]
    fn test_update_missing_key() {
        let store = MemoryKeyStore::new();
        assert!(!store.update("sk-missing", 1.0, Utc::now(), None).unwrap());
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn test_delete() {
        let store = MemoryKeyStore::new();
        store
            .upsert_many(&["sk-a".to_string(), "sk-b".to_string()], 0.0)
            .unwrap();
        assert!(store.delete("sk-a").unwrap());
        assert!(!store.delete("sk-a").unwrap());
        assert!(store.get("sk-a").unwrap().is_none());
        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[test]
    fn test_settings_set_many_overwrites() {
        let store = MemorySettingsStore::new();
        store
            .set_many(HashMap::from([("api_key".to_string(), "one".to_string())]))
            .unwrap();
        store
            .set_many(HashMap::from([("api_key".to_string(), "two".to_string())]))
            .unwrap();
        assert_eq!(store.get("api_key").unwrap().as_deref(), Some("two"));
        assert_eq!(store.get_all().unwrap().len(), 1);
    }
}
