//! 运行过程事件：计划创建、步骤开始/结算、工具调用、人工介入与结束，供 CLI / 前端展示

use serde::Serialize;
use tokio::sync::mpsc;

use crate::workflow::{AgentRole, PlanStep, StepStatus, WorkflowStatus};

/// 单个事件（可序列化为 JSON）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    /// Planner / Analyzer 产出计划
    PlanCreated { steps: Vec<PlanStep> },
    /// Supervisor 选中步骤
    StepStarted {
        step_id: u32,
        agent: AgentRole,
        description: String,
    },
    /// 调用工具
    ToolCall {
        agent: AgentRole,
        tool: String,
        args: serde_json::Value,
    },
    /// 工具返回（预览）
    ToolResult {
        agent: AgentRole,
        tool: String,
        ok: bool,
        preview: String,
    },
    /// 达到工具迭代上限，强制收尾
    BudgetExhausted { agent: AgentRole, iterations: usize },
    /// Replanner 结算步骤
    StepResolved { step_id: u32, status: StepStatus },
    /// 暂停等待人工回答
    Interrupted { question: String },
    /// 运行结束
    Finished {
        status: WorkflowStatus,
        response: String,
    },
}

/// 带线程 ID 的事件
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThreadEvent {
    pub thread_id: String,
    #[serde(flatten)]
    pub event: RunEvent,
}

/// 事件发送端：未配置接收方时静默丢弃
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::UnboundedSender<ThreadEvent>>,
    thread_id: String,
}

impl EventSink {
    pub fn new(tx: Option<mpsc::UnboundedSender<ThreadEvent>>) -> Self {
        Self {
            tx,
            thread_id: String::new(),
        }
    }

    /// 绑定线程 ID
    pub fn for_thread(&self, thread_id: &str) -> Self {
        Self {
            tx: self.tx.clone(),
            thread_id: thread_id.to_string(),
        }
    }

    pub fn emit(&self, event: RunEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(ThreadEvent {
                thread_id: self.thread_id.clone(),
                event,
            });
        }
    }
}

/// 文本预览，避免事件过长
pub fn preview(s: &str, max_chars: usize) -> String {
    if s.chars().count() > max_chars {
        format!("{}...", s.chars().take(max_chars).collect::<String>())
    } else {
        s.to_string()
    }
}
