//! Steward - 多 Agent 任务助手
//!
//! 模块划分：
//! - **agents**: Planner / Analyzer、Supervisor、三个 Worker、Replanner 与运行事件
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误、运行状态与检查点、线程级串行化
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / DeepSeek / Mock / Scripted）
//! - **memory**: 对话消息、长期记忆与事实抽取
//! - **store**: 检查点与待处理中断的存储（内存 / SQLite）
//! - **tools**: 各 Worker 的工具箱（邮件、预订、日历与记忆）与执行器
//! - **workflow**: 计划模型、工作流驱动与构建器

pub mod agents;
pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod store;
pub mod tools;
pub mod workflow;

pub use agents::InboundEmail;
pub use workflow::{RunReply, Workflow, WorkflowBuilder};
