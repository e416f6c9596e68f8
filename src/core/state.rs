//! 运行状态与检查点
//!
//! `RunState` 是一个线程的完整工作状态；`Checkpoint` 在其外包一层运行阶段
//! （即将执行的节点 / 暂停 / 结束），每经过一个节点就持久化一次，重启后可据此恢复。

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::agents::emotion::UserEmotion;
use crate::memory::Message;
use crate::workflow::{Node, Plan, StepKey, WorkflowStatus};

/// 单个线程的工作状态
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    pub thread_id: String,
    /// 当前顶层请求
    pub input: String,
    pub plan: Plan,
    /// 人类 / 助手对话日志（只追加，跨请求保留）
    pub messages: Vec<Message>,
    /// 步骤描述 -> 结果（跨请求保留，产出新计划时清空）
    pub context: BTreeMap<String, String>,
    pub last_tool_output: String,
    pub final_response: String,
    pub workflow_status: WorkflowStatus,
    pub current_step_index: usize,
    #[serde(default)]
    pub emotion: Option<UserEmotion>,
}

impl RunState {
    pub fn new(thread_id: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            input: input.into(),
            plan: Plan::default(),
            messages: Vec::new(),
            context: BTreeMap::new(),
            last_tool_output: String::new(),
            final_response: String::new(),
            workflow_status: WorkflowStatus::Continue,
            current_step_index: 0,
            emotion: None,
        }
    }

    /// 新的顶层请求：保留对话与 context，重置计划与输出
    pub fn begin_request(&mut self, input: impl Into<String>) {
        let input = input.into();
        self.messages.push(Message::user(&input));
        self.input = input;
        self.plan = Plan::default();
        self.last_tool_output.clear();
        self.final_response.clear();
        self.workflow_status = WorkflowStatus::Continue;
        self.current_step_index = 0;
    }
}

/// 暂停点：恢复 Worker 循环所需的全部信息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suspension {
    pub node: Node,
    pub step_key: StepKey,
    pub iteration: usize,
    pub transcript: Vec<Message>,
    pub question: String,
}

/// 运行阶段
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum RunPhase {
    /// 即将执行 `next`
    Ready { next: Node },
    /// 等待人工回答
    Suspended(Suspension),
    Done,
}

/// 运行来源：手动输入或收件箱
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunOrigin {
    #[default]
    Manual,
    Inbox { source: serde_json::Value },
}

/// 持久化单元：状态 + 阶段
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub state: RunState,
    pub phase: RunPhase,
    #[serde(default)]
    pub origin: RunOrigin,
    /// 本次运行已经过的节点数
    #[serde(default)]
    pub node_visits: usize,
    /// 收件箱线程暂停时登记的中断 ID
    #[serde(default)]
    pub interrupt_id: Option<String>,
    /// 毫秒时间戳
    pub updated_at: i64,
}

impl Checkpoint {
    /// 从已有状态（可能为空）开始一次新请求
    pub fn fresh_request(
        previous: Option<Checkpoint>,
        thread_id: &str,
        input: &str,
        entry: Node,
        origin: RunOrigin,
    ) -> Self {
        let mut state = previous
            .map(|cp| cp.state)
            .unwrap_or_else(|| RunState::new(thread_id, ""));
        state.begin_request(input);
        Self {
            state,
            phase: RunPhase::Ready { next: entry },
            origin,
            node_visits: 0,
            interrupt_id: None,
            updated_at: now_millis(),
        }
    }

    pub fn suspension(&self) -> Option<&Suspension> {
        match &self.phase {
            RunPhase::Suspended(s) => Some(s),
            _ => None,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = now_millis();
    }
}

pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
