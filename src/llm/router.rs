//! 按 Agent 选择模型
//!
//! 每个需要生成能力的组件占一个 `ModelSlot`；模型名先查 `[llm.agents]` 覆盖表，
//! 再回退到 `[llm].model`。后端按 provider 与 API Key 决定，均不可用时回退 Mock。

use std::sync::Arc;

use crate::config::AppConfig;
use crate::llm::{create_deepseek_client, LlmClient, LlmError, MockLlmClient, OpenAiClient};

/// 需要模型的组件
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelSlot {
    Planner,
    Analyzer,
    EmailAgent,
    BookingAgent,
    GeneralAgent,
    Replanner,
    MemoryExtractor,
}

impl ModelSlot {
    pub const ALL: [ModelSlot; 7] = [
        ModelSlot::Planner,
        ModelSlot::Analyzer,
        ModelSlot::EmailAgent,
        ModelSlot::BookingAgent,
        ModelSlot::GeneralAgent,
        ModelSlot::Replanner,
        ModelSlot::MemoryExtractor,
    ];

    /// `[llm.agents]` 中的键名
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelSlot::Planner => "planner",
            ModelSlot::Analyzer => "analyzer",
            ModelSlot::EmailAgent => "email_agent",
            ModelSlot::BookingAgent => "booking_agent",
            ModelSlot::GeneralAgent => "general_agent",
            ModelSlot::Replanner => "replanner",
            ModelSlot::MemoryExtractor => "memory_extractor",
        }
    }
}

/// 该组件使用的模型名
pub fn model_for(cfg: &AppConfig, slot: ModelSlot) -> String {
    cfg.llm
        .agents
        .get(slot.as_str())
        .cloned()
        .unwrap_or_else(|| cfg.llm.model.clone())
}

/// 为指定组件创建客户端
pub fn create_llm_for_slot(cfg: &AppConfig, slot: ModelSlot) -> Result<Arc<dyn LlmClient>, LlmError> {
    let provider = cfg.llm.provider.to_lowercase();
    let model = model_for(cfg, slot);
    let has_deepseek_key = std::env::var("DEEPSEEK_API_KEY").is_ok();
    let has_openai_key = std::env::var("OPENAI_API_KEY").is_ok();

    let client: Arc<dyn LlmClient> = match provider.as_str() {
        "deepseek" if has_deepseek_key || has_openai_key => {
            tracing::info!("Using DeepSeek LLM ({}) for {}", model, slot.as_str());
            Arc::new(apply_temperature(
                create_deepseek_client(Some(&model), cfg.llm.timeout_secs)?,
                cfg,
            ))
        }
        "openai" if has_openai_key => {
            tracing::info!("Using OpenAI LLM ({}) for {}", model, slot.as_str());
            Arc::new(apply_temperature(
                OpenAiClient::new(
                    cfg.llm.base_url.as_deref(),
                    &model,
                    std::env::var("OPENAI_API_KEY").ok().as_deref(),
                    cfg.llm.timeout_secs,
                )?,
                cfg,
            ))
        }
        "mock" => Arc::new(MockLlmClient),
        _ => {
            tracing::warn!(
                "No API key set or provider unknown ({}), using Mock LLM for {}",
                provider,
                slot.as_str()
            );
            Arc::new(MockLlmClient)
        }
    };
    Ok(client)
}

fn apply_temperature(client: OpenAiClient, cfg: &AppConfig) -> OpenAiClient {
    match cfg.llm.temperature {
        Some(t) => client.with_temperature(t),
        None => client,
    }
}
