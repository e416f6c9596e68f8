//! Analyzer：收件箱入口的规划变体
//!
//! 对一封来信判断是否需要处理；空步骤列表表示忽略（推广、垃圾邮件、通知等）。

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::agents::structured::parse_structured;
use crate::core::AgentError;
use crate::llm::LlmClient;
use crate::memory::Message;
use crate::workflow::StepDraft;

/// 入站邮件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundEmail {
    pub subject: String,
    pub sender: String,
    pub body: String,
}

impl InboundEmail {
    /// Analyzer 的输入文本
    pub fn to_input(&self) -> String {
        format!(
            "Subject: {}\nFrom: {}\nBody:\n{}",
            self.subject, self.sender, self.body
        )
    }

    /// 写入 context["source_email"] 的摘要
    pub fn summary(&self) -> String {
        format!("Subject: {}; From: {}", self.subject, self.sender)
    }
}

#[derive(Debug, Deserialize)]
struct AnalyzerReply {
    #[serde(default)]
    steps: Vec<StepDraft>,
}

pub struct Analyzer {
    llm: Arc<dyn LlmClient>,
    system_prompt: String,
}

impl Analyzer {
    pub fn new(llm: Arc<dyn LlmClient>, system_prompt: impl Into<String>) -> Self {
        Self {
            llm,
            system_prompt: system_prompt.into(),
        }
    }

    /// 返回需要执行的步骤；为空表示忽略该邮件
    pub async fn analyze(&self, email_input: &str) -> Result<Vec<StepDraft>, AgentError> {
        let messages = vec![
            Message::system(&self.system_prompt),
            Message::user(email_input),
        ];
        let output = self
            .llm
            .complete(&messages)
            .await
            .map_err(|e| AgentError::PlanningFailure(e.to_string()))?;
        let reply: AnalyzerReply = parse_structured(&output)?;
        Ok(reply
            .steps
            .into_iter()
            .filter(|s| !s.description.trim().is_empty())
            .collect())
    }
}
