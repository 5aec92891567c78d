//! 上游 Key 池
//!
//! 在 KeyStore 之上提供：
//! - 随机负载均衡选 Key（只在余额 > 0 的 Key 中均匀随机）
//! - 单个 / 批量 / 全量检测，检测结果无论成败都写回存储
//!
//! 选 Key 是对当前存储快照的只读操作，不持有跨请求的锁；
//! 手动检测与全量检测并发写同一个 Key 时以最后一次写入为准

mod error;
pub mod validator;

pub use error::PoolError;
pub use validator::{KeyValidator, UpstreamValidator, ValidationResult};

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;

use crate::common::mask_key;
use crate::store::{KeyRecord, KeyStore};

/// 默认每批检测数量
pub const DEFAULT_BATCH_SIZE: usize = 10;
/// 默认批次间隔
pub const DEFAULT_BATCH_DELAY: Duration = Duration::from_secs(1);

/// 单个 Key 检测完成后的结果（已写回存储）
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationOutcome {
    pub key: String,
    pub is_valid: bool,
    pub balance: f64,
    pub message: String,
    pub last_updated: DateTime<Utc>,
}

/// 批量检测中单个 Key 的状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    /// 检测通过
    Valid,
    /// 检测未通过（余额已置 0）
    Invalid,
    /// Key 不在存储中，未发起检测
    NotFound,
    /// 检测完成但写回存储失败
    StoreFailed,
}

/// 批量检测中单个 Key 的结果
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyCheckItem {
    pub key: String,
    pub status: CheckStatus,
    pub is_valid: bool,
    pub balance: f64,
    pub message: String,
    pub last_updated: Option<DateTime<Utc>>,
}

impl KeyCheckItem {
    fn not_found(key: &str) -> Self {
        Self {
            key: key.to_string(),
            status: CheckStatus::NotFound,
            is_valid: false,
            balance: 0.0,
            message: "key not found".to_string(),
            last_updated: None,
        }
    }
}

/// 批量检测汇总
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchOutcome {
    /// 检测通过的数量
    pub updated: usize,
    /// 其余（未通过 / 不存在 / 写回失败）的数量
    pub failed: usize,
    pub total: usize,
    pub results: Vec<KeyCheckItem>,
}

impl BatchOutcome {
    fn push(&mut self, item: KeyCheckItem) {
        if item.status == CheckStatus::Valid {
            self.updated += 1;
        } else {
            self.failed += 1;
        }
        self.total += 1;
        self.results.push(item);
    }
}

/// 池统计
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolStats {
    pub total: usize,
    pub eligible: usize,
    pub total_balance: f64,
}

/// 规整 Key 列表：去空白、去空行、去重（保持原顺序）
pub fn normalize_keys<S: AsRef<str>>(keys: &[S]) -> Vec<String> {
    let mut seen = HashSet::new();
    keys.iter()
        .map(|k| k.as_ref().trim())
        .filter(|k| !k.is_empty())
        .filter(|k| seen.insert(k.to_string()))
        .map(|k| k.to_string())
        .collect()
}

/// 上游 Key 池
pub struct KeyPool {
    store: Arc<dyn KeyStore>,
    validator: Arc<dyn KeyValidator>,
    batch_size: usize,
    batch_delay: Duration,
}

impl KeyPool {
    pub fn new(store: Arc<dyn KeyStore>, validator: Arc<dyn KeyValidator>) -> Self {
        Self {
            store,
            validator,
            batch_size: DEFAULT_BATCH_SIZE,
            batch_delay: DEFAULT_BATCH_DELAY,
        }
    }

    /// 设置全量检测的批大小和批次间隔
    pub fn with_batch_policy(mut self, batch_size: usize, batch_delay: Duration) -> Self {
        self.batch_size = batch_size.max(1);
        self.batch_delay = batch_delay;
        self
    }

    /// 全部 Key（按余额降序）
    pub fn list(&self) -> Result<Vec<KeyRecord>, PoolError> {
        Ok(self.store.list()?)
    }

    /// 可参与负载均衡的 Key（余额 > 0）
    pub fn eligible(&self) -> Result<Vec<KeyRecord>, PoolError> {
        Ok(self
            .store
            .list()?
            .into_iter()
            .filter(KeyRecord::is_eligible)
            .collect())
    }

    /// 随机选择一个可用 Key
    pub fn select(&self) -> Result<String, PoolError> {
        let mut eligible = self.eligible()?;
        if eligible.is_empty() {
            return Err(PoolError::NoCapacity);
        }
        let index = fastrand::usize(..eligible.len());
        Ok(eligible.swap_remove(index).key)
    }

    /// 可用 Key 的余额总和
    pub fn total_balance(&self) -> Result<f64, PoolError> {
        Ok(self.eligible()?.iter().map(|r| r.balance).sum())
    }

    /// 池统计
    pub fn stats(&self) -> Result<PoolStats, PoolError> {
        let records = self.store.list()?;
        let eligible: Vec<&KeyRecord> = records.iter().filter(|r| r.is_eligible()).collect();
        Ok(PoolStats {
            total: records.len(),
            eligible: eligible.len(),
            total_balance: eligible.iter().map(|r| r.balance).sum(),
        })
    }

    /// 添加单个 Key（已存在时重置记录）
    pub fn add_key(&self, key: &str, balance: f64) -> Result<(), PoolError> {
        let key = key.trim();
        if key.is_empty() {
            return Err(PoolError::InvalidKey {
                reason: "Key 不能为空".to_string(),
            });
        }
        self.store.upsert(key, balance)?;
        tracing::info!("已添加 Key {}", mask_key(key));
        Ok(())
    }

    /// 批量添加 Key（余额为 0，等待检测），返回实际添加的 Key
    pub fn add_keys<S: AsRef<str>>(&self, keys: &[S]) -> Result<Vec<String>, PoolError> {
        let keys = normalize_keys(keys);
        if keys.is_empty() {
            return Err(PoolError::InvalidKey {
                reason: "Key 列表不能为空".to_string(),
            });
        }
        self.store.upsert_many(&keys, 0.0)?;
        tracing::info!("已批量添加 {} 个 Key", keys.len());
        Ok(keys)
    }

    /// 删除 Key
    pub fn delete_key(&self, key: &str) -> Result<(), PoolError> {
        if !self.store.delete(key)? {
            return Err(PoolError::key_not_found(key));
        }
        tracing::info!("已删除 Key {}", mask_key(key));
        Ok(())
    }

    /// 检测单个 Key 并写回结果
    ///
    /// 检测失败同样更新 lastUpdated 并把余额置 0
    pub async fn validate_one(&self, key: &str) -> Result<ValidationOutcome, PoolError> {
        if self.store.get(key)?.is_none() {
            return Err(PoolError::key_not_found(key));
        }

        let result = self.validator.validate(key).await;
        let now = Utc::now();
        let last_error = (!result.is_valid).then(|| result.message.clone());

        if !self.store.update(key, result.balance, now, last_error)? {
            // 检测期间被删除
            return Err(PoolError::key_not_found(key));
        }

        tracing::info!(
            "Key {} 检测完成: valid={}, balance={}",
            mask_key(key),
            result.is_valid,
            result.balance
        );

        Ok(ValidationOutcome {
            key: key.to_string(),
            is_valid: result.is_valid,
            balance: result.balance,
            message: result.message,
            last_updated: now,
        })
    }

    /// 检测全部 Key
    ///
    /// 按批处理：批内并发，批间等待 batch_delay。
    /// 单个 Key 的失败只记录在结果中，不会中断整个流程
    pub async fn validate_all(&self) -> Result<BatchOutcome, PoolError> {
        let keys: Vec<String> = self.store.list()?.into_iter().map(|r| r.key).collect();
        let mut outcome = BatchOutcome::default();
        if keys.is_empty() {
            return Ok(outcome);
        }

        let batch_count = keys.len().div_ceil(self.batch_size);
        tracing::info!(
            "开始检测全部 Key: 共 {} 个，分 {} 批",
            keys.len(),
            batch_count
        );

        for (index, batch) in keys.chunks(self.batch_size).enumerate() {
            let items = join_all(batch.iter().map(|key| self.check_and_record(key))).await;
            for item in items {
                outcome.push(item);
            }

            if index + 1 < batch_count && !self.batch_delay.is_zero() {
                tokio::time::sleep(self.batch_delay).await;
            }
        }

        tracing::info!(
            "全部 Key 检测完成: 通过 {}，失败 {}",
            outcome.updated,
            outcome.failed
        );
        Ok(outcome)
    }

    /// 检测指定的一组 Key（全部并发，不分批）
    ///
    /// 不在存储中的 Key 直接标记为 not_found，不发起检测
    pub async fn validate_many<S: AsRef<str>>(
        &self,
        keys: &[S],
    ) -> Result<BatchOutcome, PoolError> {
        let keys = normalize_keys(keys);
        let existing: HashSet<String> = self.store.list()?.into_iter().map(|r| r.key).collect();

        let items = join_all(keys.iter().map(|key| async {
            if existing.contains(key) {
                self.check_and_record(key).await
            } else {
                KeyCheckItem::not_found(key)
            }
        }))
        .await;

        let mut outcome = BatchOutcome::default();
        for item in items {
            outcome.push(item);
        }
        tracing::info!(
            "指定 Key 检测完成: 共 {}，通过 {}，失败 {}",
            outcome.total,
            outcome.updated,
            outcome.failed
        );
        Ok(outcome)
    }

    /// 检测一个 Key 并写回，所有错误都折算进结果
    async fn check_and_record(&self, key: &str) -> KeyCheckItem {
        let result = self.validator.validate(key).await;
        let now = Utc::now();
        let last_error = (!result.is_valid).then(|| result.message.clone());

        let status = match self.store.update(key, result.balance, now, last_error) {
            Ok(true) if result.is_valid => CheckStatus::Valid,
            Ok(true) => CheckStatus::Invalid,
            Ok(false) => {
                tracing::warn!("Key {} 在检测期间被删除", mask_key(key));
                CheckStatus::NotFound
            }
            Err(e) => {
                tracing::error!("写回 Key {} 检测结果失败: {}", mask_key(key), e);
                return KeyCheckItem {
                    key: key.to_string(),
                    status: CheckStatus::StoreFailed,
                    is_valid: result.is_valid,
                    balance: result.balance,
                    message: format!("store update failed: {}", e),
                    last_updated: None,
                };
            }
        };

        KeyCheckItem {
            key: key.to_string(),
            status,
            is_valid: result.is_valid,
            balance: result.balance,
            message: result.message,
            last_updated: (status != CheckStatus::NotFound).then_some(now),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryKeyStore, StoreError};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    /// 按 Key 返回预设余额的检测器，未预设的 Key 视为无效
    #[derive(Default)]
    struct FakeValidator {
        balances: HashMap<String, f64>,
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        delay: Duration,
    }

    impl FakeValidator {
        fn with(balances: &[(&str, f64)]) -> Self {
            Self {
                balances: balances
                    .iter()
                    .map(|(k, b)| (k.to_string(), *b))
                    .collect(),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl KeyValidator for FakeValidator {
        async fn validate(&self, key: &str) -> ValidationResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(current, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            match self.balances.get(key) {
                Some(balance) => ValidationResult::valid(*balance),
                None => ValidationResult::invalid("Invalid token"),
            }
        }
    }

    /// update 永远失败的存储
    struct BrokenUpdateStore(MemoryKeyStore);

    impl KeyStore for BrokenUpdateStore {
        fn list(&self) -> Result<Vec<KeyRecord>, StoreError> {
            self.0.list()
        }
        fn get(&self, key: &str) -> Result<Option<KeyRecord>, StoreError> {
            self.0.get(key)
        }
        fn upsert(&self, key: &str, balance: f64) -> Result<(), StoreError> {
            self.0.upsert(key, balance)
        }
        fn upsert_many(&self, keys: &[String], balance: f64) -> Result<(), StoreError> {
            self.0.upsert_many(keys, balance)
        }
        fn delete(&self, key: &str) -> Result<bool, StoreError> {
            self.0.delete(key)
        }
        fn update(
            &self,
            _key: &str,
            _balance: f64,
            _last_updated: DateTime<Utc>,
            _last_error: Option<String>,
        ) -> Result<bool, StoreError> {
            Err(StoreError::Io(std::io::Error::other("disk full")))
        }
    }

    fn pool_with(records: &[(&str, f64)], validator: FakeValidator) -> (KeyPool, Arc<FakeValidator>) {
        let store = MemoryKeyStore::with_records(
            records.iter().map(|(k, b)| KeyRecord::new(*k, *b)),
        );
        let validator = Arc::new(validator);
        let pool = KeyPool::new(Arc::new(store), validator.clone())
            .with_batch_policy(DEFAULT_BATCH_SIZE, Duration::ZERO);
        (pool, validator)
    }

    #[test]
    fn test_select_only_eligible_key() {
        let (pool, _) = pool_with(&[("k1", 5.0), ("k2", 0.0)], FakeValidator::default());
        for _ in 0..200 {
            assert_eq!(pool.select().unwrap(), "k1");
        }
    }

    #[test]
    fn test_select_no_capacity() {
        let (pool, _) = pool_with(&[("k1", 0.0), ("k2", 0.0)], FakeValidator::default());
        assert!(pool.select().unwrap_err().is_no_capacity());

        let (empty, _) = pool_with(&[], FakeValidator::default());
        assert!(empty.select().unwrap_err().is_no_capacity());
    }

    #[test]
    fn test_select_is_roughly_uniform() {
        let (pool, _) = pool_with(
            &[("a", 1.0), ("b", 100.0), ("c", 0.01), ("z", 0.0)],
            FakeValidator::default(),
        );
        let mut counts: HashMap<String, usize> = HashMap::new();
        for _ in 0..3000 {
            *counts.entry(pool.select().unwrap()).or_default() += 1;
        }
        assert!(!counts.contains_key("z"));
        for key in ["a", "b", "c"] {
            let count = counts[key];
            assert!(
                (800..=1200).contains(&count),
                "Key {} 被选中 {} 次，分布不均匀",
                key,
                count
            );
        }
    }

    #[test]
    fn test_delete_makes_key_ineligible() {
        let (pool, _) = pool_with(&[("k1", 5.0), ("k2", 3.0)], FakeValidator::default());
        pool.delete_key("k1").unwrap();
        for _ in 0..50 {
            assert_eq!(pool.select().unwrap(), "k2");
        }
        assert!(pool.list().unwrap().iter().all(|r| r.key != "k1"));
        assert!(pool.delete_key("k1").unwrap_err().is_key_not_found());
    }

    #[test]
    fn test_add_keys_normalizes_and_readd_resets() {
        let (pool, _) = pool_with(&[("k1", 5.0)], FakeValidator::default());
        let added = pool.add_keys(&[" k2 ", "", "k1", "k2"]).unwrap();
        assert_eq!(added, vec!["k2".to_string(), "k1".to_string()]);

        let records = pool.list().unwrap();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.balance == 0.0));
        assert!(pool.select().unwrap_err().is_no_capacity());

        assert!(matches!(
            pool.add_key("   ", 1.0),
            Err(PoolError::InvalidKey { .. })
        ));
    }

    #[test]
    fn test_total_balance_and_stats() {
        let (pool, _) = pool_with(
            &[("a", 3.0), ("b", 7.0), ("c", 0.0)],
            FakeValidator::default(),
        );
        assert_eq!(pool.total_balance().unwrap(), 10.0);
        assert_eq!(
            pool.stats().unwrap(),
            PoolStats {
                total: 3,
                eligible: 2,
                total_balance: 10.0
            }
        );
    }

    #[tokio::test]
    async fn test_validate_one_success_clears_error() {
        let (pool, _) = pool_with(&[("k1", 0.0)], FakeValidator::with(&[("k1", 8.5)]));
        let outcome = pool.validate_one("k1").await.unwrap();
        assert!(outcome.is_valid);

        let record = &pool.list().unwrap()[0];
        assert_eq!(record.balance, 8.5);
        assert_eq!(record.last_updated, Some(outcome.last_updated));
        assert!(record.last_error.is_none());
    }

    #[tokio::test]
    async fn test_validate_one_failure_zeroes_balance() {
        let (pool, _) = pool_with(&[("k1", 5.0)], FakeValidator::default());
        let outcome = pool.validate_one("k1").await.unwrap();
        assert!(!outcome.is_valid);

        let record = &pool.list().unwrap()[0];
        assert_eq!(record.balance, 0.0);
        assert!(record.last_updated.is_some());
        assert_eq!(record.last_error.as_deref(), Some("Invalid token"));
        assert!(pool.select().unwrap_err().is_no_capacity());
    }

    #[tokio::test]
    async fn test_validate_one_not_found() {
        let (pool, validator) = pool_with(&[], FakeValidator::default());
        assert!(pool.validate_one("ghost").await.unwrap_err().is_key_not_found());
        assert_eq!(validator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_validate_all_counts_add_up_when_everything_fails() {
        let keys: Vec<String> = (0..23).map(|i| format!("k{}", i)).collect();
        let records: Vec<(&str, f64)> = keys.iter().map(|k| (k.as_str(), 1.0)).collect();
        let (pool, _) = pool_with(&records, FakeValidator::default());

        let outcome = pool.validate_all().await.unwrap();
        assert_eq!(outcome.updated, 0);
        assert_eq!(outcome.failed, 23);
        assert_eq!(outcome.updated + outcome.failed, outcome.total);
        assert_eq!(outcome.results.len(), 23);
        assert!(pool.eligible().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_validate_all_batches_with_delay() {
        let keys: Vec<String> = (0..25).map(|i| format!("k{}", i)).collect();
        let records: Vec<(&str, f64)> = keys.iter().map(|k| (k.as_str(), 0.0)).collect();
        let balances: Vec<(&str, f64)> = keys.iter().map(|k| (k.as_str(), 2.0)).collect();
        let mut validator = FakeValidator::with(&balances);
        validator.delay = Duration::from_millis(20);

        let store = MemoryKeyStore::with_records(
            records.iter().map(|(k, b)| KeyRecord::new(*k, *b)),
        );
        let validator = Arc::new(validator);
        let pool = KeyPool::new(Arc::new(store), validator.clone())
            .with_batch_policy(10, Duration::from_millis(50));

        let started = Instant::now();
        let outcome = pool.validate_all().await.unwrap();
        let elapsed = started.elapsed();

        assert_eq!(outcome.updated, 25);
        assert_eq!(outcome.failed, 0);
        assert_eq!(validator.calls.load(Ordering::SeqCst), 25);
        // 批内并发，但不超过批大小
        assert_eq!(validator.max_in_flight.load(Ordering::SeqCst), 10);
        // 3 批之间有 2 次等待
        assert!(elapsed >= Duration::from_millis(100), "耗时 {:?}", elapsed);
        assert_eq!(pool.total_balance().unwrap(), 50.0);
    }

    #[tokio::test]
    async fn test_validate_all_store_failure_is_recorded() {
        let store = BrokenUpdateStore(MemoryKeyStore::with_records([
            KeyRecord::new("k1", 1.0),
            KeyRecord::new("k2", 1.0),
        ]));
        let pool = KeyPool::new(Arc::new(store), Arc::new(FakeValidator::with(&[("k1", 1.0)])))
            .with_batch_policy(10, Duration::ZERO);

        let outcome = pool.validate_all().await.unwrap();
        assert_eq!(outcome.failed, 2);
        assert!(
            outcome
                .results
                .iter()
                .all(|item| item.status == CheckStatus::StoreFailed)
        );
    }

    #[tokio::test]
    async fn test_validate_many_reports_unknown_keys_without_calls() {
        let (pool, validator) = pool_with(
            &[("k1", 0.0), ("k2", 4.0)],
            FakeValidator::with(&[("k1", 6.0)]),
        );

        let outcome = pool
            .validate_many(&["k1", "k2", "ghost", "k1"])
            .await
            .unwrap();

        assert_eq!(outcome.total, 3);
        assert_eq!(outcome.updated, 1);
        assert_eq!(outcome.failed, 2);
        assert_eq!(validator.calls.load(Ordering::SeqCst), 2);

        let status: HashMap<&str, CheckStatus> = outcome
            .results
            .iter()
            .map(|item| (item.key.as_str(), item.status))
            .collect();
        assert_eq!(status["k1"], CheckStatus::Valid);
        assert_eq!(status["k2"], CheckStatus::Invalid);
        assert_eq!(status["ghost"], CheckStatus::NotFound);
        assert_eq!(pool.select().unwrap(), "k1");
    }

    #[tokio::test]
    async fn test_validate_many_runs_concurrently() {
        let keys: Vec<String> = (0..15).map(|i| format!("k{}", i)).collect();
        let records: Vec<(&str, f64)> = keys.iter().map(|k| (k.as_str(), 0.0)).collect();
        let mut validator = FakeValidator::default();
        validator.delay = Duration::from_millis(20);
        let (pool, validator) = pool_with(&records, validator);

        let outcome = pool.validate_many(&keys).await.unwrap();
        assert_eq!(outcome.total, 15);
        assert_eq!(validator.max_in_flight.load(Ordering::SeqCst), 15);
    }

    #[test]
    fn test_normalize_keys() {
        assert_eq!(
            normalize_keys(&["a", " b", "", "a", "  "]),
            vec!["a".to_string(), "b".to_string()]
        );
    }
}
