//! 事实抽取：运行结束后让模型从对话中提炼长期事实并写入长期记忆
//!
//! 尽力而为：任何失败只记 warn，不影响本次回复。

use std::sync::Arc;

use serde::Deserialize;

use crate::agents::structured::parse_structured;
use crate::llm::LlmClient;
use crate::memory::{format_history, LongTermMemory, MemoryFact, Message};

#[derive(Debug, Deserialize)]
struct ExtractedFacts {
    #[serde(default)]
    facts: Vec<MemoryFact>,
}

pub struct MemoryExtractor {
    llm: Arc<dyn LlmClient>,
    memory: Arc<dyn LongTermMemory>,
    system_prompt: String,
    history_turns: usize,
}

impl MemoryExtractor {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        memory: Arc<dyn LongTermMemory>,
        system_prompt: impl Into<String>,
        history_turns: usize,
    ) -> Self {
        Self {
            llm,
            memory,
            system_prompt: system_prompt.into(),
            history_turns,
        }
    }

    /// 抽取并写入，返回写入条数（失败时为 0）
    pub async fn extract_and_store(&self, thread_id: &str, messages: &[Message]) -> usize {
        if !self.memory.enabled() || messages.is_empty() {
            return 0;
        }
        let request = vec![
            Message::system(&self.system_prompt),
            Message::user(format_history(messages, self.history_turns)),
        ];
        let output = match self.llm.complete(&request).await {
            Ok(o) => o,
            Err(e) => {
                tracing::warn!(thread_id, "fact extraction failed: {}", e);
                return 0;
            }
        };
        let facts: Vec<MemoryFact> = match parse_structured::<ExtractedFacts>(&output) {
            Ok(r) => r
                .facts
                .into_iter()
                .filter(|f| !f.text.trim().is_empty())
                .collect(),
            Err(e) => {
                tracing::warn!(thread_id, "fact extraction returned invalid JSON: {}", e);
                return 0;
            }
        };
        if facts.is_empty() {
            return 0;
        }
        match self.memory.store(&facts).await {
            Ok(n) => {
                tracing::info!(thread_id, stored = n, "long-term facts stored");
                n
            }
            Err(e) => {
                tracing::warn!(thread_id, "storing facts failed: {}", e);
                0
            }
        }
    }
}
