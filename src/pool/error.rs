//! Key 池错误类型定义

use crate::store::StoreError;

/// Key 池操作错误
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// Key 不存在
    #[error("Key 不存在: {key}")]
    KeyNotFound { key: String },

    /// 没有余额大于 0 的 Key
    #[error("no available API keys")]
    NoCapacity,

    /// Key 格式无效（如空字符串）
    #[error("无效的 Key: {reason}")]
    InvalidKey { reason: String },

    /// 存储错误
    #[error("存储错误: {0}")]
    Store(#[from] StoreError),
}

impl PoolError {
    /// 创建 KeyNotFound（Key 已脱敏）
    pub fn key_not_found(key: &str) -> Self {
        PoolError::KeyNotFound {
            key: crate::common::mask_key(key),
        }
    }

    /// 检查是否为"Key 不存在"错误
    pub fn is_key_not_found(&self) -> bool {
        matches!(self, PoolError::KeyNotFound { .. })
    }

    /// 检查是否为"无可用 Key"错误
    pub fn is_no_capacity(&self) -> bool {
        matches!(self, PoolError::NoCapacity)
    }
}
