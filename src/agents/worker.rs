//! Worker 工具循环
//!
//! 三个 Worker 共用同一骨架，只在系统提示词、工具箱与迭代上限上不同：
//! 生成 -> (需要人工输入? 暂停) -> (无工具调用? 返回文本) -> 执行工具 -> 下一轮；
//! 达到上限后强制一次不带工具的收尾生成，因此单步最多 max_iterations + 1 次生成。
//! 暂停时返回 (iteration, transcript, question)，恢复时从同一 iteration 继续，不清零。

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::agents::events::{preview, EventSink, RunEvent};
use crate::llm::LlmClient;
use crate::memory::{Message, ToolCall};
use crate::tools::{ToolError, ToolExecutor};
use crate::workflow::{AgentRole, PlanStep};

/// 模型请求人工输入的标记
pub const NEED_INPUT_MARKER: &str = "[NEED_INPUT]";

const FORCE_FINAL_PROMPT: &str = "You have reached the maximum number of tool iterations. \
Do NOT call any more tools. Synthesize a final answer from the information you have gathered so far.";

/// 工具结果预览最大字符数
const TOOL_PREVIEW_CHARS: usize = 200;

/// 单步执行结果
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerOutcome {
    /// 步骤产出（成功或错误文本都在这里，由 Replanner 判定）
    Completed(String),
    /// 需要人工回答后才能继续
    NeedsInput(WorkerPause),
}

/// 暂停时的可恢复状态
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerPause {
    pub iteration: usize,
    pub transcript: Vec<Message>,
    pub question: String,
}

/// 若回复中带有 NEED_INPUT 标记，返回去掉标记后的问题
pub fn need_input_question(text: &str) -> Option<String> {
    if !text.contains(NEED_INPUT_MARKER) {
        return None;
    }
    let question = text.replace(NEED_INPUT_MARKER, "").trim().to_string();
    if question.is_empty() {
        Some("Could you provide more details?".to_string())
    } else {
        Some(question)
    }
}

pub struct Worker {
    role: AgentRole,
    llm: Arc<dyn LlmClient>,
    executor: ToolExecutor,
    system_prompt: String,
    max_iterations: usize,
}

impl Worker {
    pub fn new(
        role: AgentRole,
        llm: Arc<dyn LlmClient>,
        executor: ToolExecutor,
        system_prompt: impl Into<String>,
        max_iterations: usize,
    ) -> Self {
        Self {
            role,
            llm,
            executor,
            system_prompt: system_prompt.into(),
            max_iterations,
        }
    }

    pub fn role(&self) -> AgentRole {
        self.role
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    /// 初始转录：系统提示词 + 当前任务与上下文
    pub fn task_transcript(&self, step: &PlanStep, context: &BTreeMap<String, String>) -> Vec<Message> {
        let context_text = if context.is_empty() {
            "{}".to_string()
        } else {
            serde_json::to_string_pretty(context).unwrap_or_else(|_| "{}".to_string())
        };
        vec![
            Message::system(&self.system_prompt),
            Message::user(format!(
                "Current Task: {}\n\nAvailable Context:\n{}",
                step.description, context_text
            )),
        ]
    }

    /// 执行一个新步骤
    pub async fn execute(
        &self,
        step: &PlanStep,
        context: &BTreeMap<String, String>,
        events: &EventSink,
    ) -> WorkerOutcome {
        tracing::info!(agent = %self.role, step = step.id, "worker started: {}", step.description);
        let transcript = self.task_transcript(step, context);
        self.run_loop(transcript, 0, events).await
    }

    /// 带着人工回答恢复暂停的步骤
    pub async fn resume(&self, pause: WorkerPause, answer: &str, events: &EventSink) -> WorkerOutcome {
        tracing::info!(agent = %self.role, iteration = pause.iteration, "worker resumed");
        let mut transcript = pause.transcript;
        transcript.push(Message::user(format!("User provided: {}", answer)));
        self.run_loop(transcript, pause.iteration, events).await
    }

    async fn run_loop(&self, mut transcript: Vec<Message>, start: usize, events: &EventSink) -> WorkerOutcome {
        let specs = self.executor.specs();

        for iteration in start..self.max_iterations {
            let generation = match self.llm.generate(&transcript, &specs).await {
                Ok(g) => g,
                Err(e) => {
                    tracing::warn!(agent = %self.role, "generation failed: {}", e);
                    return WorkerOutcome::Completed(format!(
                        "ERROR: {} could not complete the step: {}",
                        self.role, e
                    ));
                }
            };

            if let Some(question) = need_input_question(&generation.text) {
                transcript.push(Message::assistant(generation.text));
                return WorkerOutcome::NeedsInput(WorkerPause {
                    iteration,
                    transcript,
                    question,
                });
            }

            if generation.tool_calls.is_empty() {
                return WorkerOutcome::Completed(generation.text);
            }

            transcript.push(Message::assistant_with_tools(
                generation.text,
                generation.tool_calls.clone(),
            ));
            for call in &generation.tool_calls {
                let content = self.run_tool(call, events).await;
                transcript.push(Message::tool(&call.id, content));
            }
        }

        self.force_final(transcript, events).await
    }

    async fn run_tool(&self, call: &ToolCall, events: &EventSink) -> String {
        events.emit(RunEvent::ToolCall {
            agent: self.role,
            tool: call.name.clone(),
            args: call.arguments.clone(),
        });
        let (ok, content) = match self.executor.invoke(call).await {
            Ok(out) => (true, out),
            Err(ToolError::Unknown(name)) => {
                tracing::warn!(agent = %self.role, "tool {} not found, skipping", name);
                (false, format!("Tool {} is not available to this agent.", name))
            }
            Err(e) => (false, format!("Error executing {}: {}", call.name, e)),
        };
        events.emit(RunEvent::ToolResult {
            agent: self.role,
            tool: call.name.clone(),
            ok,
            preview: preview(&content, TOOL_PREVIEW_CHARS),
        });
        content
    }

    /// 达到迭代上限：不带工具再生成一次
    async fn force_final(&self, mut transcript: Vec<Message>, events: &EventSink) -> WorkerOutcome {
        tracing::warn!(agent = %self.role, "iteration budget of {} exhausted, forcing final answer", self.max_iterations);
        events.emit(RunEvent::BudgetExhausted {
            agent: self.role,
            iterations: self.max_iterations,
        });
        transcript.push(Message::user(FORCE_FINAL_PROMPT));
        match self.llm.generate(&transcript, &[]).await {
            Ok(g) => {
                let text = g.text.replace(NEED_INPUT_MARKER, "").trim().to_string();
                WorkerOutcome::Completed(text)
            }
            Err(e) => {
                tracing::warn!(agent = %self.role, "final generation failed: {}", e);
                WorkerOutcome::Completed(format!(
                    "ERROR: {} ran out of tool iterations and could not summarize: {}",
                    self.role, e
                ))
            }
        }
    }
}
