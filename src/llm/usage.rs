//! 按组件累计 token 用量
//!
//! `TrackedLlm` 包装任意客户端，把每次成功生成的 `Usage` 记到所属 `ModelSlot` 名下；
//! 构建器为每个组件的客户端都套上这一层，CLI 的 `/usage` 读取汇总。

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::Serialize;

use crate::llm::{Generation, LlmClient, LlmError, ModelSlot, ToolSpec, Usage};
use crate::memory::Message;

/// 单个组件的累计用量
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AgentUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub requests: u64,
}

impl AgentUsage {
    pub fn total_tokens(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }
}

#[derive(Debug, Default)]
pub struct UsageTracker {
    totals: Mutex<HashMap<ModelSlot, AgentUsage>>,
}

impl UsageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, slot: ModelSlot, usage: Usage) {
        if let Ok(mut totals) = self.totals.lock() {
            let entry = totals.entry(slot).or_default();
            entry.prompt_tokens += usage.prompt_tokens;
            entry.completion_tokens += usage.completion_tokens;
            entry.requests += 1;
        }
    }

    /// 有过请求的组件，按 `ModelSlot::ALL` 顺序
    pub fn snapshot(&self) -> Vec<(ModelSlot, AgentUsage)> {
        let Ok(totals) = self.totals.lock() else {
            return Vec::new();
        };
        ModelSlot::ALL
            .iter()
            .filter_map(|slot| totals.get(slot).map(|u| (*slot, *u)))
            .collect()
    }

    pub fn total(&self) -> AgentUsage {
        self.snapshot()
            .into_iter()
            .fold(AgentUsage::default(), |mut acc, (_, u)| {
                acc.prompt_tokens += u.prompt_tokens;
                acc.completion_tokens += u.completion_tokens;
                acc.requests += u.requests;
                acc
            })
    }
}

/// 记录用量的客户端包装
pub struct TrackedLlm {
    slot: ModelSlot,
    inner: Arc<dyn LlmClient>,
    tracker: Arc<UsageTracker>,
}

impl TrackedLlm {
    pub fn new(slot: ModelSlot, inner: Arc<dyn LlmClient>, tracker: Arc<UsageTracker>) -> Self {
        Self { slot, inner, tracker }
    }
}

#[async_trait]
impl LlmClient for TrackedLlm {
    async fn generate(&self, messages: &[Message], tools: &[ToolSpec]) -> Result<Generation, LlmError> {
        let generation = self.inner.generate(messages, tools).await?;
        self.tracker.record(self.slot, generation.usage);
        tracing::debug!(
            agent = self.slot.as_str(),
            prompt_tokens = generation.usage.prompt_tokens,
            completion_tokens = generation.usage.completion_tokens,
            "token usage"
        );
        Ok(generation)
    }
}
