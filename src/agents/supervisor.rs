//! Supervisor：确定性路由
//!
//! 取顺序上第一个 pending 步骤，标记为 in_progress 并路由到其 Worker；
//! 没有 pending 步骤时路由到 Replanner。不修改描述与角色，也不结算步骤。

use crate::core::AgentError;
use crate::workflow::{Node, Plan, PlanStep};

/// 纯查询：下一步会路由到哪个节点（不修改计划）
pub fn next_node(plan: &Plan) -> Node {
    plan.next_pending()
        .map(|(_, step)| step.assigned_agent.node())
        .unwrap_or(Node::Replanner)
}

/// 路由结果
#[derive(Debug, Clone, PartialEq)]
pub enum Route {
    Worker { node: Node, step: PlanStep },
    Replanner,
}

impl Route {
    pub fn node(&self) -> Node {
        match self {
            Route::Worker { node, .. } => *node,
            Route::Replanner => Node::Replanner,
        }
    }
}

/// 路由并启动选中的步骤
pub fn route(plan: &mut Plan) -> Result<Route, AgentError> {
    match plan.next_pending() {
        Some((key, _)) => {
            let step = plan.start(key)?;
            Ok(Route::Worker {
                node: step.assigned_agent.node(),
                step,
            })
        }
        None => Ok(Route::Replanner),
    }
}
