//! 计划（Plan）：以稳定键寻址的步骤 arena
//!
//! 内部每个槽位持有一个 `StepKey`，插入/重规划都不会改变已有键；
//! 对外的 1..N 连续编号只在 `steps()` 视图中按顺序计算。

use serde::{Deserialize, Serialize};

use crate::core::AgentError;
use crate::workflow::types::{AgentRole, PlanStep, StepDraft, StepStatus};

/// 步骤的稳定键（跨插入与重编号保持不变）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StepKey(u64);

impl std::fmt::Display for StepKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct StepSlot {
    key: StepKey,
    description: String,
    status: StepStatus,
    assigned_agent: AgentRole,
}

/// 有序步骤列表
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    slots: Vec<StepSlot>,
    next_key: u64,
}

impl Plan {
    /// 由草稿创建新计划，所有步骤为 pending
    pub fn from_drafts(drafts: impl IntoIterator<Item = StepDraft>) -> Self {
        let mut plan = Self::default();
        plan.insert_at(0, drafts);
        plan
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// 对外视图：按顺序编号 1..N
    pub fn steps(&self) -> Vec<PlanStep> {
        self.slots
            .iter()
            .enumerate()
            .map(|(idx, slot)| view(idx, slot))
            .collect()
    }

    pub fn get(&self, key: StepKey) -> Option<PlanStep> {
        self.position(key).map(|idx| view(idx, &self.slots[idx]))
    }

    /// 顺序上第一个 pending 步骤
    pub fn next_pending(&self) -> Option<(StepKey, PlanStep)> {
        self.slots
            .iter()
            .enumerate()
            .find(|(_, s)| s.status == StepStatus::Pending)
            .map(|(idx, s)| (s.key, view(idx, s)))
    }

    /// 当前 in_progress 的步骤（至多一个）
    pub fn in_progress(&self) -> Option<(StepKey, PlanStep)> {
        self.slots
            .iter()
            .enumerate()
            .find(|(_, s)| s.status == StepStatus::InProgress)
            .map(|(idx, s)| (s.key, view(idx, s)))
    }

    pub fn in_progress_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| s.status == StepStatus::InProgress)
            .count()
    }

    pub fn has_pending(&self) -> bool {
        self.slots.iter().any(|s| s.status == StepStatus::Pending)
    }

    /// pending → in_progress；已有其他 in_progress 步骤时拒绝
    pub fn start(&mut self, key: StepKey) -> Result<PlanStep, AgentError> {
        if let Some((running, step)) = self.in_progress() {
            if running != key {
                let msg = format!(
                    "step {} is still in progress while starting {}",
                    step.id, key
                );
                tracing::error!("{}", msg);
                return Err(AgentError::InvariantViolation(msg));
            }
        }
        let idx = self.position(key).ok_or_else(|| {
            AgentError::InvariantViolation(format!("unknown step key {}", key))
        })?;
        let slot = &mut self.slots[idx];
        if slot.status != StepStatus::Pending {
            return Err(AgentError::InvariantViolation(format!(
                "cannot start step {} from status {}",
                idx + 1,
                slot.status
            )));
        }
        slot.status = StepStatus::InProgress;
        Ok(view(idx, slot))
    }

    /// 结算 in_progress 步骤：completed / failed，或退回 pending 重试。终态不可回退。
    pub fn resolve(&mut self, key: StepKey, status: StepStatus) -> Result<PlanStep, AgentError> {
        let idx = self.position(key).ok_or_else(|| {
            AgentError::InvariantViolation(format!("unknown step key {}", key))
        })?;
        let slot = &mut self.slots[idx];
        if slot.status.is_terminal() {
            return Err(AgentError::InvariantViolation(format!(
                "step {} is already {}",
                idx + 1,
                slot.status
            )));
        }
        if status == StepStatus::InProgress {
            return Err(AgentError::InvariantViolation(
                "only the supervisor starts steps".to_string(),
            ));
        }
        slot.status = status;
        Ok(view(idx, slot))
    }

    /// 在 `after` 之后紧接插入新步骤；`after` 为 None 时插在最前。返回新步骤的键。
    pub fn insert_after(
        &mut self,
        after: Option<StepKey>,
        drafts: impl IntoIterator<Item = StepDraft>,
    ) -> Vec<StepKey> {
        let at = after
            .and_then(|k| self.position(k))
            .map(|idx| idx + 1)
            .unwrap_or(0);
        self.insert_at(at, drafts)
    }

    /// 供提示词使用的计划摘要：`{id}. [{status}] {description} ({agent})`
    pub fn summary(&self) -> String {
        if self.slots.is_empty() {
            return "(empty plan)".to_string();
        }
        self.steps()
            .iter()
            .map(|s| {
                format!(
                    "{}. [{}] {} ({})",
                    s.id, s.status, s.description, s.assigned_agent
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn insert_at(
        &mut self,
        at: usize,
        drafts: impl IntoIterator<Item = StepDraft>,
    ) -> Vec<StepKey> {
        let mut keys = Vec::new();
        let new_slots: Vec<StepSlot> = drafts
            .into_iter()
            .map(|d| {
                let key = StepKey(self.next_key);
                self.next_key += 1;
                keys.push(key);
                StepSlot {
                    key,
                    description: d.description,
                    status: StepStatus::Pending,
                    assigned_agent: d.assigned_agent,
                }
            })
            .collect();
        let at = at.min(self.slots.len());
        self.slots.splice(at..at, new_slots);
        keys
    }

    fn position(&self, key: StepKey) -> Option<usize> {
        self.slots.iter().position(|s| s.key == key)
    }
}

fn view(idx: usize, slot: &StepSlot) -> PlanStep {
    PlanStep {
        id: (idx + 1) as u32,
        description: slot.description.clone(),
        status: slot.status,
        assigned_agent: slot.assigned_agent,
    }
}
