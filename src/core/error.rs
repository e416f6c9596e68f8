//! Agent 错误类型
//!
//! 规划、重规划、不变量、持久化与线程控制相关的错误；工具层错误见 `tools::ToolError`，
//! 只在 Worker 内部转为观察文本，不会冒泡到这里。

use thiserror::Error;

use crate::llm::LlmError;
use crate::store::StoreError;

/// 编排过程中可能出现的错误
#[derive(Error, Debug)]
pub enum AgentError {
    /// Planner 未能产出合法计划（生成失败、JSON 非法、角色未知等）
    #[error("Planning failed: {0}")]
    PlanningFailure(String),

    /// Replanner 未能产出合法结论
    #[error("Replanning failed: {0}")]
    ReplanningFailure(String),

    #[error("No in-progress step found")]
    MissingInProgressStep,

    /// 违反「至多一个 in_progress」等计划不变量
    #[error("Plan invariant violated: {0}")]
    InvariantViolation(String),

    #[error("JSON parse error: {0}")]
    JsonParseError(String),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Thread not found: {0}")]
    ThreadNotFound(String),

    #[error("Thread {0} is not waiting for input")]
    NotSuspended(String),

    #[error("Thread {0} is waiting for input; resume it with an answer")]
    AwaitingInput(String),

    #[error("Pending interrupt not found: {0}")]
    InterruptNotFound(String),

    #[error("Pending interrupt {0} is already {1}")]
    InterruptClosed(String, String),
}

impl From<config::ConfigError> for AgentError {
    fn from(e: config::ConfigError) -> Self {
        AgentError::ConfigError(e.to_string())
    }
}
