//! Planner：把用户请求拆成有序步骤，或直接给出对话式回复
//!
//! 模型输出 JSON（见 `prompts::PLANNER`）。不含 Planner 对象的回复视为对话式回答，
//! 正文里偶然出现的 `{...}`（没有任何 Planner 字段）也算在内；
//! JSON 非法、角色未知、生成失败均为 PlanningFailure。

use std::sync::Arc;

use serde::Deserialize;

use crate::agents::emotion::UserEmotion;
use crate::agents::structured::{extract_json, parse_structured};
use crate::core::AgentError;
use crate::llm::LlmClient;
use crate::memory::{format_history, Message};
use crate::workflow::StepDraft;

/// 规划结果
#[derive(Debug, Clone, PartialEq)]
pub enum PlanOutcome {
    /// 无需执行动作，直接回复
    Conversational { response: String },
    /// 需要执行的步骤（可能为空）
    Steps(Vec<StepDraft>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlannerResult {
    pub outcome: PlanOutcome,
    pub emotion: Option<UserEmotion>,
}

#[derive(Debug, Deserialize)]
struct PlannerReply {
    #[serde(default)]
    is_conversational: bool,
    #[serde(default)]
    direct_response: String,
    #[serde(default)]
    steps: Vec<StepDraft>,
    #[serde(default)]
    emotion: Option<serde_json::Value>,
}

const PLANNER_KEYS: [&str; 3] = ["is_conversational", "direct_response", "steps"];

/// 提取出的片段是否像 Planner 对象；解析不了时按字段名是否出现判断，好让残缺的计划报错
fn looks_like_plan(json: &str) -> bool {
    match serde_json::from_str::<serde_json::Value>(json) {
        Ok(serde_json::Value::Object(map)) => PLANNER_KEYS.iter().any(|k| map.contains_key(*k)),
        Ok(_) => false,
        Err(_) => PLANNER_KEYS.iter().any(|k| json.contains(*k)),
    }
}

/// Planner：持有 LLM 与 system prompt
pub struct Planner {
    llm: Arc<dyn LlmClient>,
    system_prompt: String,
    history_turns: usize,
}

impl Planner {
    pub fn new(llm: Arc<dyn LlmClient>, system_prompt: impl Into<String>, history_turns: usize) -> Self {
        Self {
            llm,
            system_prompt: system_prompt.into(),
            history_turns,
        }
    }

    /// 规划：`history` 为本次请求之前的对话，`retrieved_facts` 为长期记忆检索结果
    pub async fn plan(
        &self,
        input: &str,
        history: &[Message],
        retrieved_facts: &[String],
    ) -> Result<PlannerResult, AgentError> {
        let mut prompt = String::new();
        if !retrieved_facts.is_empty() {
            prompt.push_str("Known facts about the user:\n");
            for fact in retrieved_facts {
                prompt.push_str(&format!("- {}\n", fact));
            }
            prompt.push('\n');
        }
        prompt.push_str(&format!(
            "Conversation so far:\n{}\n\nLatest user message:\n{}",
            format_history(history, self.history_turns),
            input
        ));

        let messages = vec![Message::system(&self.system_prompt), Message::user(prompt)];
        let output = self
            .llm
            .complete(&messages)
            .await
            .map_err(|e| AgentError::PlanningFailure(e.to_string()))?;

        parse_planner_output(&output)
    }
}

/// 解析 Planner 输出
pub fn parse_planner_output(output: &str) -> Result<PlannerResult, AgentError> {
    let text = output.trim();
    if text.is_empty() {
        return Err(AgentError::PlanningFailure("empty planner output".to_string()));
    }
    let json = extract_json(output);
    if !json.is_some_and(looks_like_plan) {
        // 只有一个无关对象、没有正文，不能当作回复
        if json.is_some_and(|j| j.trim() == text) {
            return Err(AgentError::PlanningFailure(format!(
                "planner output has none of the expected fields: {}",
                text
            )));
        }
        return Ok(PlannerResult {
            outcome: PlanOutcome::Conversational {
                response: text.to_string(),
            },
            emotion: None,
        });
    }

    let reply: PlannerReply =
        parse_structured(output).map_err(|e| AgentError::PlanningFailure(e.to_string()))?;

    let emotion = reply
        .emotion
        .and_then(|v| serde_json::from_value::<UserEmotion>(v).ok())
        .map(UserEmotion::clamped);

    let outcome = if reply.is_conversational {
        if reply.direct_response.trim().is_empty() {
            return Err(AgentError::PlanningFailure(
                "conversational reply without a response".to_string(),
            ));
        }
        if !reply.steps.is_empty() {
            tracing::warn!(
                "Planner marked the request conversational but returned {} steps; ignoring them",
                reply.steps.len()
            );
        }
        PlanOutcome::Conversational {
            response: reply.direct_response,
        }
    } else {
        let steps = reply
            .steps
            .into_iter()
            .filter(|s| !s.description.trim().is_empty())
            .collect();
        PlanOutcome::Steps(steps)
    };

    Ok(PlannerResult { outcome, emotion })
}
