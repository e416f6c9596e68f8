//! 待处理中断登记：收件箱线程暂停时登记问题，供人工统一处理

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::core::now_millis;
use crate::store::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterruptStatus {
    Pending,
    Resolved,
    Dismissed,
}

impl InterruptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InterruptStatus::Pending => "pending",
            InterruptStatus::Resolved => "resolved",
            InterruptStatus::Dismissed => "dismissed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(InterruptStatus::Pending),
            "resolved" => Some(InterruptStatus::Resolved),
            "dismissed" => Some(InterruptStatus::Dismissed),
            _ => None,
        }
    }
}

impl std::fmt::Display for InterruptStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 一条待人工回答的问题
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingInterrupt {
    pub id: String,
    pub thread_id: String,
    pub question: String,
    pub status: InterruptStatus,
    /// 来源邮件等元数据
    pub source_context: serde_json::Value,
    pub created_at: i64,
    pub resolved_at: Option<i64>,
}

impl PendingInterrupt {
    pub fn new(thread_id: impl Into<String>, question: impl Into<String>, source_context: serde_json::Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            thread_id: thread_id.into(),
            question: question.into(),
            status: InterruptStatus::Pending,
            source_context,
            created_at: now_millis(),
            resolved_at: None,
        }
    }
}

#[async_trait]
pub trait InterruptRegistry: Send + Sync {
    async fn save_pending(&self, interrupt: &PendingInterrupt) -> Result<(), StoreError>;

    async fn get_pending(&self, id: &str) -> Result<Option<PendingInterrupt>, StoreError>;

    /// 同一线程再次暂停时更新问题；仅 pending 可改，否则 `StoreError::Conflict`
    async fn update_question(&self, id: &str, question: &str) -> Result<(), StoreError>;

    /// 仅 pending 可结算；否则 `StoreError::Conflict`
    async fn resolve(&self, id: &str) -> Result<(), StoreError>;

    /// 仅 pending 可跳过；否则 `StoreError::Conflict`
    async fn dismiss(&self, id: &str) -> Result<(), StoreError>;

    /// 按创建时间倒序；`status` 为 None 时返回全部
    async fn list_pending(&self, status: Option<InterruptStatus>) -> Result<Vec<PendingInterrupt>, StoreError>;
}

/// 内存实现
#[derive(Default)]
pub struct MemoryInterruptRegistry {
    items: RwLock<HashMap<String, PendingInterrupt>>,
}

impl MemoryInterruptRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    async fn close(&self, id: &str, status: InterruptStatus) -> Result<(), StoreError> {
        let mut items = self.items.write().await;
        let item = items
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(format!("interrupt {}", id)))?;
        if item.status != InterruptStatus::Pending {
            return Err(StoreError::Conflict(format!("interrupt {} is already {}", id, item.status)));
        }
        item.status = status;
        item.resolved_at = Some(now_millis());
        Ok(())
    }
}

#[async_trait]
impl InterruptRegistry for MemoryInterruptRegistry {
    async fn save_pending(&self, interrupt: &PendingInterrupt) -> Result<(), StoreError> {
        self.items
            .write()
            .await
            .insert(interrupt.id.clone(), interrupt.clone());
        Ok(())
    }

    async fn get_pending(&self, id: &str) -> Result<Option<PendingInterrupt>, StoreError> {
        Ok(self.items.read().await.get(id).cloned())
    }

    async fn update_question(&self, id: &str, question: &str) -> Result<(), StoreError> {
        let mut items = self.items.write().await;
        let item = items
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(format!("interrupt {}", id)))?;
        if item.status != InterruptStatus::Pending {
            return Err(StoreError::Conflict(format!("interrupt {} is already {}", id, item.status)));
        }
        item.question = question.to_string();
        Ok(())
    }

    async fn resolve(&self, id: &str) -> Result<(), StoreError> {
        self.close(id, InterruptStatus::Resolved).await
    }

    async fn dismiss(&self, id: &str) -> Result<(), StoreError> {
        self.close(id, InterruptStatus::Dismissed).await
    }

    async fn list_pending(&self, status: Option<InterruptStatus>) -> Result<Vec<PendingInterrupt>, StoreError> {
        let mut out: Vec<PendingInterrupt> = self
            .items
            .read()
            .await
            .values()
            .filter(|i| status.map_or(true, |s| i.status == s))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }
}
