//! JSON 文件存储实现
//!
//! 内存中持有完整数据，每次修改后整体回写文件（keys.json / settings.json）。
//! 回写失败时内存数据保持不变

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use super::{ConfigStore, KeyRecord, KeyStore, StoreError, sanitize_balance, sort_records};

/// 读取 JSON 文件，文件不存在或为空时返回 None
fn read_json_file<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    if !path.exists() {
        return Ok(None);
    }

    let content = fs::read_to_string(path)?;
    if content.trim().is_empty() {
        return Ok(None);
    }

    Ok(Some(serde_json::from_str(&content)?))
}

fn write_json_file<T: serde::Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let content = serde_json::to_string_pretty(value)?;
    fs::write(path, content)?;
    Ok(())
}

/// JSON 文件 Key 存储
pub struct JsonKeyStore {
    records: RwLock<Vec<KeyRecord>>,
    file_path: PathBuf,
}

impl JsonKeyStore {
    /// 打开（或新建）Key 存储文件
    pub fn open<P: AsRef<Path>>(file_path: P) -> Result<Self, StoreError> {
        let file_path = file_path.as_ref().to_path_buf();
        let records: Vec<KeyRecord> = read_json_file(&file_path)?.unwrap_or_default();

        let mut seen = HashSet::new();
        for record in &records {
            if !seen.insert(record.key.as_str()) {
                return Err(StoreError::Corrupted {
                    reason: format!("重复的 Key 记录: {}", crate::common::mask_key(&record.key)),
                });
            }
        }

        Ok(Self {
            records: RwLock::new(records),
            file_path,
        })
    }

    /// 存储文件路径
    pub fn path(&self) -> &Path {
        &self.file_path
    }

    fn upsert_locked(records: &mut Vec<KeyRecord>, key: &str, balance: f64) {
        let record = KeyRecord::new(key, balance);
        match records.iter_mut().find(|r| r.key == key) {
            Some(existing) => *existing = record,
            None => records.push(record),
        }
    }
}

impl KeyStore for JsonKeyStore {
    fn list(&self) -> Result<Vec<KeyRecord>, StoreError> {
        let mut records = self.records.read().clone();
        sort_records(&mut records);
        Ok(records)
    }

    fn get(&self, key: &str) -> Result<Option<KeyRecord>, StoreError> {
        Ok(self.records.read().iter().find(|r| r.key == key).cloned())
    }

    fn upsert(&self, key: &str, balance: f64) -> Result<(), StoreError> {
        let mut records = self.records.write();
        let mut next = records.clone();
        Self::upsert_locked(&mut next, key, balance);
        write_json_file(&self.file_path, &next)?;
        *records = next;
        Ok(())
    }

    fn upsert_many(&self, keys: &[String], balance: f64) -> Result<(), StoreError> {
        let mut records = self.records.write();
        let mut next = records.clone();
        for key in keys {
            Self::upsert_locked(&mut next, key, balance);
        }
        write_json_file(&self.file_path, &next)?;
        *records = next;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let mut records = self.records.write();
        if !records.iter().any(|r| r.key == key) {
            return Ok(false);
        }
        let next: Vec<KeyRecord> = records.iter().filter(|r| r.key != key).cloned().collect();
        write_json_file(&self.file_path, &next)?;
        *records = next;
        Ok(true)
    }

    fn update(
        &self,
        key: &str,
        balance: f64,
        last_updated: DateTime<Utc>,
        last_error: Option<String>,
    ) -> Result<bool, StoreError> {
        let mut records = self.records.write();
        let Some(index) = records.iter().position(|r| r.key == key) else {
            return Ok(false);
        };
        let mut next = records.clone();
        let record = &mut next[index];
        record.balance = sanitize_balance(balance);
        record.last_updated = Some(last_updated);
        record.last_error = last_error;
        write_json_file(&self.file_path, &next)?;
        *records = next;
        Ok(true)
    }
}

/// JSON 文件配置存储（name -> value 映射）
pub struct JsonSettingsStore {
    values: RwLock<HashMap<String, String>>,
    file_path: PathBuf,
}

impl JsonSettingsStore {
    /// 打开（或新建）配置存储文件
    pub fn open<P: AsRef<Path>>(file_path: P) -> Result<Self, StoreError> {
        let file_path = file_path.as_ref().to_path_buf();
        let values = read_json_file(&file_path)?.unwrap_or_default();
        Ok(Self {
            values: RwLock::new(values),
            file_path,
        })
    }

    /// 存储文件路径
    pub fn path(&self) -> &Path {
        &self.file_path
    }
}

impl ConfigStore for JsonSettingsStore {
    fn get(&self, name: &str) -> Result<Option<String>, StoreError> {
        Ok(self.values.read().get(name).cloned())
    }

    fn get_all(&self) -> Result<HashMap<String, String>, StoreError> {
        Ok(self.values.read().clone())
    }

    fn set_many(&self, values: HashMap<String, String>) -> Result<(), StoreError> {
        let mut current = self.values.write();
        let mut next = current.clone();
        next.extend(values);
        write_json_file(&self.file_path, &next)?;
        *current = next;
        Ok(())
    }
}
