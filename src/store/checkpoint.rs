//! 检查点存储：按 thread_id 读最新、追加新检查点（后写者胜）

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::RwLock;

use crate::core::{now_millis, Checkpoint, RunPhase};
use crate::memory::Message;
use crate::store::StoreError;
use crate::workflow::WorkflowStatus;

/// 对最新检查点的局部修改
#[derive(Debug, Clone, Default)]
pub struct StateUpdate {
    pub phase: Option<RunPhase>,
    pub workflow_status: Option<WorkflowStatus>,
    pub final_response: Option<String>,
    pub append_messages: Vec<Message>,
}

impl StateUpdate {
    pub fn apply(self, cp: &mut Checkpoint) {
        if let Some(phase) = self.phase {
            cp.phase = phase;
        }
        if let Some(status) = self.workflow_status {
            cp.state.workflow_status = status;
        }
        if let Some(response) = self.final_response {
            cp.state.final_response = response;
        }
        cp.state.messages.extend(self.append_messages);
        cp.updated_at = now_millis();
    }
}

/// 线程概览
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThreadSummary {
    pub thread_id: String,
    pub input: String,
    pub workflow_status: WorkflowStatus,
    pub pending_question: Option<String>,
    pub steps: usize,
    pub updated_at: i64,
}

impl ThreadSummary {
    pub fn from_checkpoint(cp: &Checkpoint) -> Self {
        Self {
            thread_id: cp.state.thread_id.clone(),
            input: cp.state.input.clone(),
            workflow_status: cp.state.workflow_status,
            pending_question: cp.suspension().map(|s| s.question.clone()),
            steps: cp.state.plan.len(),
            updated_at: cp.updated_at,
        }
    }
}

#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// 最新检查点
    async fn get_state(&self, thread_id: &str) -> Result<Option<Checkpoint>, StoreError>;

    /// 追加一个检查点（成为该线程的最新状态）
    async fn put_state(&self, checkpoint: &Checkpoint) -> Result<(), StoreError>;

    /// 读最新 -> 修改 -> 追加
    async fn update_state(&self, thread_id: &str, update: StateUpdate) -> Result<Checkpoint, StoreError> {
        let mut cp = self
            .get_state(thread_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("thread {}", thread_id)))?;
        update.apply(&mut cp);
        self.put_state(&cp).await?;
        Ok(cp)
    }

    /// 所有线程的概览，最近更新在前
    async fn list_threads(&self) -> Result<Vec<ThreadSummary>, StoreError>;
}

/// 内存实现（进程退出即丢失）
#[derive(Default)]
pub struct MemoryCheckpointStore {
    latest: RwLock<HashMap<String, Checkpoint>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn get_state(&self, thread_id: &str) -> Result<Option<Checkpoint>, StoreError> {
        Ok(self.latest.read().await.get(thread_id).cloned())
    }

    async fn put_state(&self, checkpoint: &Checkpoint) -> Result<(), StoreError> {
        self.latest
            .write()
            .await
            .insert(checkpoint.state.thread_id.clone(), checkpoint.clone());
        Ok(())
    }

    async fn list_threads(&self) -> Result<Vec<ThreadSummary>, StoreError> {
        let mut out: Vec<ThreadSummary> = self
            .latest
            .read()
            .await
            .values()
            .map(ThreadSummary::from_checkpoint)
            .collect();
        out.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::RunOrigin;
    use crate::workflow::Node;

    #[tokio::test]
    async fn test_put_get_and_update() {
        let store = MemoryCheckpointStore::new();
        assert!(store.get_state("t1").await.unwrap().is_none());

        let cp = Checkpoint::fresh_request(None, "t1", "hi", Node::Planner, RunOrigin::Manual);
        store.put_state(&cp).await.unwrap();
        let updated = store
            .update_state(
                "t1",
                StateUpdate {
                    phase: Some(RunPhase::Done),
                    workflow_status: Some(WorkflowStatus::Finished),
                    final_response: Some("hello!".into()),
                    append_messages: vec![Message::assistant("hello!")],
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.phase, RunPhase::Done);
        let got = store.get_state("t1").await.unwrap().unwrap();
        assert_eq!(got.state.final_response, "hello!");
        assert_eq!(got.state.messages.len(), 2);

        let threads = store.list_threads().await.unwrap();
        assert_eq!(threads.len(), 1);
        assert_eq!(threads[0].workflow_status, WorkflowStatus::Finished);
    }

    #[tokio::test]
    async fn test_update_missing_thread() {
        let store = MemoryCheckpointStore::new();
        let err = store.update_state("nope", StateUpdate::default()).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }
}
