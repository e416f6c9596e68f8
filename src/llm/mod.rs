//! LLM 层：客户端抽象与实现（OpenAI 兼容 / DeepSeek / Mock / Scripted）与按 Agent 的模型选择

pub mod deepseek;
pub mod mock;
pub mod openai;
pub mod router;
pub mod traits;
pub mod usage;

pub use deepseek::{create_deepseek_client, DEEPSEEK_CHAT, DEEPSEEK_REASONER};
pub use mock::{MockLlmClient, RecordedRequest, ScriptedLlmClient};
pub use openai::OpenAiClient;
pub use router::{create_llm_for_slot, model_for, ModelSlot};
pub use traits::{Generation, LlmClient, LlmError, ToolSpec, Usage};
pub use usage::{AgentUsage, TrackedLlm, UsageTracker};
