//! 持久化：检查点存储与待处理中断登记
//!
//! 两个 trait 各有内存与 SQLite 两种实现；SQLite 版本共用同一个数据库文件。

pub mod checkpoint;
pub mod interrupts;
pub mod sqlite;

pub use checkpoint::{CheckpointStore, MemoryCheckpointStore, StateUpdate, ThreadSummary};
pub use interrupts::{InterruptRegistry, InterruptStatus, MemoryInterruptRegistry, PendingInterrupt};
pub use sqlite::SqliteStore;

use thiserror::Error;

/// 存储层错误
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    /// 状态迁移不合法（如已结算的中断再次结算）
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Storage backend error: {0}")]
    Backend(String),
}
