//! 存储错误类型定义

/// 存储操作错误
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// IO 错误
    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    /// JSON 错误
    #[error("JSON 错误: {0}")]
    Json(#[from] serde_json::Error),

    /// 存储文件内容损坏
    #[error("存储数据损坏: {reason}")]
    Corrupted { reason: String },
}
