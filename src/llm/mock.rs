//! Mock / Scripted LLM 客户端（无需 API）
//!
//! - `MockLlmClient`：离线兜底，回显最后一条 User 消息（纯文本，无工具调用），
//!   Planner 会把它当作对话式回复，便于本地跑通流程。
//! - `ScriptedLlmClient`：按脚本依次返回预设结果，并记录每次请求，供测试断言。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::llm::{Generation, LlmClient, LlmError, ToolSpec};
use crate::memory::{Message, Role, ToolCall};

/// Mock 客户端：回显用户最后一条消息
#[derive(Debug, Default)]
pub struct MockLlmClient;

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn generate(&self, messages: &[Message], _tools: &[ToolSpec]) -> Result<Generation, LlmError> {
        let last_user = messages
            .iter()
            .rev()
            .find(|m| matches!(m.role, Role::User))
            .map(|m| m.content.as_str())
            .unwrap_or("(no input)");

        Ok(Generation::text(format!("Echo from Mock: {}", last_user)))
    }
}

/// 一次被记录的请求
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub messages: Vec<Message>,
    pub tool_names: Vec<String>,
}

/// 脚本化客户端：每次 generate 弹出一条预设结果；脚本耗尽后返回 `repeat` 或错误
#[derive(Default)]
pub struct ScriptedLlmClient {
    script: Mutex<VecDeque<Result<Generation, String>>>,
    repeat: Option<Generation>,
    calls: AtomicUsize,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一条纯文本回复
    pub fn reply(self, text: impl Into<String>) -> Self {
        self.push(Ok(Generation::text(text)))
    }

    /// 追加一条单工具调用回复
    pub fn tool_call(self, name: &str, arguments: Value) -> Self {
        let n = self.len() + 1;
        let call = ToolCall::new(format!("call_{}", n), name, arguments);
        self.push(Ok(Generation::with_tool_calls("", vec![call])))
    }

    /// 追加一条多工具调用回复
    pub fn tool_calls(self, calls: Vec<ToolCall>) -> Self {
        self.push(Ok(Generation::with_tool_calls("", calls)))
    }

    /// 追加一次生成失败
    pub fn fail(self, message: impl Into<String>) -> Self {
        self.push(Err(message.into()))
    }

    /// 脚本耗尽后始终返回该结果
    pub fn repeating(mut self, generation: Generation) -> Self {
        self.repeat = Some(generation);
        self
    }

    /// 已发生的 generate 调用次数
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// 剩余脚本条数
    pub fn remaining(&self) -> usize {
        self.len()
    }

    fn len(&self) -> usize {
        self.script.lock().map(|s| s.len()).unwrap_or(0)
    }

    fn push(self, item: Result<Generation, String>) -> Self {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(item);
        }
        self
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn generate(&self, messages: &[Message], tools: &[ToolSpec]) -> Result<Generation, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(RecordedRequest {
                messages: messages.to_vec(),
                tool_names: tools.iter().map(|t| t.name.clone()).collect(),
            });
        }
        let next = self.script.lock().ok().and_then(|mut s| s.pop_front());
        match next {
            Some(Ok(generation)) => Ok(generation),
            Some(Err(message)) => Err(LlmError::Request(message)),
            None => self
                .repeat
                .clone()
                .ok_or_else(|| LlmError::Request("script exhausted".to_string())),
        }
    }
}
