//! 工具执行器
//!
//! 持有某个 Worker 的 Toolbox 与超时，invoke(call) 在超时内调用 toolbox.invoke，
//! 超时转为 ToolError::Timeout；每次调用输出结构化审计日志（JSON）。

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::timeout;

use crate::llm::ToolSpec;
use crate::memory::ToolCall;
use crate::tools::{ToolError, Toolbox};
use crate::workflow::AgentRole;

/// 工具执行器：对每次调用施加超时并记录审计日志
#[derive(Clone)]
pub struct ToolExecutor {
    agent: AgentRole,
    toolbox: Arc<dyn Toolbox>,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(agent: AgentRole, toolbox: Arc<dyn Toolbox>, timeout_secs: u64) -> Self {
        Self {
            agent,
            toolbox,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    pub fn specs(&self) -> Vec<ToolSpec> {
        self.toolbox.specs()
    }

    pub async fn invoke(&self, call: &ToolCall) -> Result<String, ToolError> {
        let start = Instant::now();
        let result = match timeout(self.timeout, self.toolbox.invoke(call)).await {
            Ok(r) => r,
            Err(_) => Err(ToolError::Timeout(call.name.clone())),
        };

        let outcome = match &result {
            Ok(_) => "ok",
            Err(ToolError::Unknown(_)) => "unknown_tool",
            Err(ToolError::InvalidArguments { .. }) => "invalid_arguments",
            Err(ToolError::Failed(_)) => "error",
            Err(ToolError::Timeout(_)) => "timeout",
        };
        let audit = serde_json::json!({
            "event": "tool_audit",
            "agent": self.agent.as_str(),
            "tool": call.name,
            "ok": result.is_ok(),
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": args_preview(&call.arguments),
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        result
    }
}

fn args_preview(args: &serde_json::Value) -> String {
    let s = args.to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}
