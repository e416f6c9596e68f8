//! 工作流类型定义
//!
//! 计划步骤、步骤状态、执行者角色、图节点与整体运行状态。

use std::fmt;

use serde::{Deserialize, Serialize};

/// 步骤状态：pending → in_progress → completed / failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl StepStatus {
    /// 是否为终态（completed / failed）
    pub fn is_terminal(&self) -> bool {
        matches!(self, StepStatus::Completed | StepStatus::Failed)
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepStatus::Pending => write!(f, "pending"),
            StepStatus::InProgress => write!(f, "in_progress"),
            StepStatus::Completed => write!(f, "completed"),
            StepStatus::Failed => write!(f, "failed"),
        }
    }
}

/// 执行步骤的 Worker 角色（固定枚举）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgentRole {
    EmailAgent,
    BookingAgent,
    #[serde(alias = "UtilityAgent")]
    GeneralAgent,
}

impl AgentRole {
    pub const ALL: [AgentRole; 3] = [
        AgentRole::EmailAgent,
        AgentRole::BookingAgent,
        AgentRole::GeneralAgent,
    ];

    /// 该角色对应的图节点
    pub fn node(&self) -> Node {
        match self {
            AgentRole::EmailAgent => Node::EmailAgent,
            AgentRole::BookingAgent => Node::BookingAgent,
            AgentRole::GeneralAgent => Node::GeneralAgent,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentRole::EmailAgent => "EmailAgent",
            AgentRole::BookingAgent => "BookingAgent",
            AgentRole::GeneralAgent => "GeneralAgent",
        }
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 图中的节点：Planner / Analyzer 为入口，Supervisor 路由，三个 Worker，Replanner 收尾
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Node {
    Planner,
    Analyzer,
    Supervisor,
    EmailAgent,
    BookingAgent,
    GeneralAgent,
    Replanner,
}

impl Node {
    /// Worker 节点对应的角色；非 Worker 节点返回 None
    pub fn worker_role(&self) -> Option<AgentRole> {
        match self {
            Node::EmailAgent => Some(AgentRole::EmailAgent),
            Node::BookingAgent => Some(AgentRole::BookingAgent),
            Node::GeneralAgent => Some(AgentRole::GeneralAgent),
            _ => None,
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Node::Planner => "planner",
            Node::Analyzer => "analyzer",
            Node::Supervisor => "supervisor",
            Node::EmailAgent => "email_agent",
            Node::BookingAgent => "booking_agent",
            Node::GeneralAgent => "general_agent",
            Node::Replanner => "replanner",
        };
        f.write_str(s)
    }
}

/// 整体运行状态（仅 Replanner 与入口短路会写入终态）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum WorkflowStatus {
    #[default]
    Continue,
    Finished,
    Failed,
}

impl WorkflowStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, WorkflowStatus::Continue)
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkflowStatus::Continue => write!(f, "CONTINUE"),
            WorkflowStatus::Finished => write!(f, "FINISHED"),
            WorkflowStatus::Failed => write!(f, "FAILED"),
        }
    }
}

/// 计划中的一步（对外视图：id 为 1 起的连续编号）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanStep {
    pub id: u32,
    pub description: String,
    pub status: StepStatus,
    pub assigned_agent: AgentRole,
}

/// 尚未编号的步骤草稿（Planner / Analyzer / Replanner 的模型输出）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepDraft {
    pub description: String,
    pub assigned_agent: AgentRole,
}

impl StepDraft {
    pub fn new(description: impl Into<String>, assigned_agent: AgentRole) -> Self {
        Self {
            description: description.into(),
            assigned_agent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_status_serde_snake_case() {
        let s = serde_json::to_string(&StepStatus::InProgress).unwrap();
        assert_eq!(s, "\"in_progress\"");
        assert_eq!(StepStatus::InProgress.to_string(), "in_progress");
    }

    #[test]
    fn test_utility_agent_alias() {
        let draft: StepDraft =
            serde_json::from_str(r#"{"description":"look up the weather","assigned_agent":"UtilityAgent"}"#)
                .unwrap();
        assert_eq!(draft.assigned_agent, AgentRole::GeneralAgent);
    }

    #[test]
    fn test_unknown_agent_rejected() {
        let res: Result<StepDraft, _> =
            serde_json::from_str(r#"{"description":"x","assigned_agent":"PhoneAgent"}"#);
        assert!(res.is_err());
    }

    #[test]
    fn test_workflow_status_wire_format() {
        let s: WorkflowStatus = serde_json::from_str("\"FINISHED\"").unwrap();
        assert_eq!(s, WorkflowStatus::Finished);
        assert!(s.is_terminal());
        assert!(!WorkflowStatus::Continue.is_terminal());
    }

    #[test]
    fn test_role_node_mapping() {
        for role in AgentRole::ALL {
            assert_eq!(role.node().worker_role(), Some(role));
        }
        assert_eq!(Node::Replanner.worker_role(), None);
    }
}
