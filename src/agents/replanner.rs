//! Replanner：每步执行后结算步骤、插入纠正步骤、决定 CONTINUE / FINISHED / FAILED
//!
//! 模型只给出判断（见 `prompts::REPLANNER`），状态机规则在 `apply_decision` 里确定执行：
//! 模型报 FAILED 则失败；否则仍有 pending 步骤就继续，没有就结束。
//! 模型调用或解析失败时步骤保持未结算，以原始工具输出作为尽力而为的最终回复。

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Deserialize;

use crate::agents::structured::parse_structured;
use crate::core::{AgentError, RunState};
use crate::llm::LlmClient;
use crate::memory::{format_history, Message};
use crate::workflow::{Plan, PlanStep, StepDraft, StepKey, StepStatus, WorkflowStatus};

/// 模型对已执行步骤的判定
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepVerdict {
    Completed,
    Failed,
    /// 退回 pending 重试
    Pending,
}

impl From<StepVerdict> for StepStatus {
    fn from(v: StepVerdict) -> Self {
        match v {
            StepVerdict::Completed => StepStatus::Completed,
            StepVerdict::Failed => StepStatus::Failed,
            StepVerdict::Pending => StepStatus::Pending,
        }
    }
}

/// 模型输出
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ReplanDecision {
    #[serde(default)]
    pub status: WorkflowStatus,
    #[serde(default)]
    pub step_status: Option<StepVerdict>,
    #[serde(default)]
    pub new_steps: Vec<StepDraft>,
    #[serde(default)]
    pub final_response: String,
}

/// 一次重规划的结果
#[derive(Debug, Clone, PartialEq)]
pub struct ReplanOutcome {
    pub status: WorkflowStatus,
    /// 被结算的步骤（结算后的视图）
    pub resolved: Option<PlanStep>,
    pub inserted: usize,
}

pub struct Replanner {
    llm: Arc<dyn LlmClient>,
    system_prompt: String,
    history_turns: usize,
}

impl Replanner {
    pub fn new(llm: Arc<dyn LlmClient>, system_prompt: impl Into<String>, history_turns: usize) -> Self {
        Self {
            llm,
            system_prompt: system_prompt.into(),
            history_turns,
        }
    }

    /// 调用模型评估刚执行的步骤
    pub async fn evaluate(
        &self,
        plan: &Plan,
        executed: Option<&PlanStep>,
        last_output: &str,
        history: &[Message],
    ) -> Result<ReplanDecision, AgentError> {
        let current = executed
            .map(|s| format!("{}. {} ({})", s.id, s.description, s.assigned_agent))
            .unwrap_or_else(|| "(none)".to_string());
        let prompt = format!(
            "Conversation:\n{}\n\nPlan:\n{}\n\nCurrent Step: {}\n\nTool Output:\n{}",
            format_history(history, self.history_turns),
            plan.summary(),
            current,
            if last_output.is_empty() { "(none)" } else { last_output }
        );
        let messages = vec![Message::system(&self.system_prompt), Message::user(prompt)];
        let output = self
            .llm
            .complete(&messages)
            .await
            .map_err(|e| AgentError::ReplanningFailure(e.to_string()))?;
        parse_structured(&output).map_err(|e| AgentError::ReplanningFailure(e.to_string()))
    }

    /// 评估并应用到运行状态；失败时降级而不是报错
    pub async fn replan(&self, state: &mut RunState) -> ReplanOutcome {
        let executed = state.plan.in_progress();
        let decision = self
            .evaluate(
                &state.plan,
                executed.as_ref().map(|(_, s)| s),
                &state.last_tool_output,
                &state.messages,
            )
            .await;

        match decision.and_then(|d| apply_decision(state, executed.map(|(k, _)| k), d)) {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!("replanning failed, surfacing raw output: {}", e);
                state.workflow_status = WorkflowStatus::Failed;
                state.final_response = if state.last_tool_output.trim().is_empty() {
                    "Sorry, I couldn't work out whether your request was completed.".to_string()
                } else {
                    state.last_tool_output.clone()
                };
                ReplanOutcome {
                    status: WorkflowStatus::Failed,
                    resolved: None,
                    inserted: 0,
                }
            }
        }
    }
}

/// 把模型判定应用到状态上
pub fn apply_decision(
    state: &mut RunState,
    executed: Option<StepKey>,
    decision: ReplanDecision,
) -> Result<ReplanOutcome, AgentError> {
    let resolved = match executed {
        Some(key) => {
            // 缺省判定：输出以 ERROR 开头视为失败
            let verdict = decision.step_status.map(StepStatus::from).unwrap_or_else(|| {
                if state.last_tool_output.starts_with("ERROR") {
                    StepStatus::Failed
                } else {
                    StepStatus::Completed
                }
            });
            Some(state.plan.resolve(key, verdict)?)
        }
        None => None,
    };

    let inserted = state.plan.insert_after(executed, decision.new_steps).len();

    let status = if decision.status == WorkflowStatus::Failed {
        WorkflowStatus::Failed
    } else if state.plan.has_pending() {
        WorkflowStatus::Continue
    } else {
        WorkflowStatus::Finished
    };

    state.workflow_status = status;
    state.final_response = match status {
        WorkflowStatus::Continue => String::new(),
        WorkflowStatus::Finished if decision.final_response.trim().is_empty() => {
            synthesize_summary(&state.plan, &state.context)
        }
        WorkflowStatus::Failed if decision.final_response.trim().is_empty() => format!(
            "Sorry, I couldn't complete your request. Last result: {}",
            state.last_tool_output
        ),
        _ => decision.final_response,
    };

    Ok(ReplanOutcome {
        status,
        resolved,
        inserted,
    })
}

/// 模型未给出最终回复时，按计划顺序从 context 汇总
pub fn synthesize_summary(plan: &Plan, context: &BTreeMap<String, String>) -> String {
    let lines: Vec<String> = plan
        .steps()
        .iter()
        .filter_map(|s| {
            context
                .get(&s.description)
                .map(|r| format!("- {} [{}]: {}", s.description, s.status, r))
        })
        .collect();
    if lines.is_empty() {
        "All done.".to_string()
    } else {
        format!("Here's what I did:\n{}", lines.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedLlmClient;
    use crate::workflow::AgentRole;

    fn running_state() -> (RunState, StepKey) {
        let mut state = RunState::new("t1", "book me a hotel in Lisbon and email Ana");
        state.plan = Plan::from_drafts(vec![
            StepDraft::new("search hotels in Lisbon", AgentRole::BookingAgent),
            StepDraft::new("email Ana the booking", AgentRole::EmailAgent),
        ]);
        let (key, _) = state.plan.next_pending().unwrap();
        state.plan.start(key).unwrap();
        (state, key)
    }

    #[test]
    fn test_failed_step_gets_corrective_step_right_after() {
        let (mut state, key) = running_state();
        state.last_tool_output = "No hotels found in Lisbon.".into();
        let decision = ReplanDecision {
            status: WorkflowStatus::Continue,
            step_status: Some(StepVerdict::Failed),
            new_steps: vec![StepDraft::new("search nearby area", AgentRole::BookingAgent)],
            final_response: String::new(),
        };
        let out = apply_decision(&mut state, Some(key), decision).unwrap();
        assert_eq!(out.status, WorkflowStatus::Continue);
        assert_eq!(out.inserted, 1);
        let steps = state.plan.steps();
        assert_eq!(steps.iter().map(|s| s.id).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(steps[0].status, StepStatus::Failed);
        assert_eq!(steps[1].description, "search nearby area");
        assert_eq!(steps[2].description, "email Ana the booking");
        assert_eq!(state.workflow_status, WorkflowStatus::Continue);
        assert!(state.final_response.is_empty());
    }

    #[test]
    fn test_finished_when_no_pending_left_and_summary_synthesized() {
        let mut state = RunState::new("t1", "draft an email");
        state.plan = Plan::from_drafts(vec![StepDraft::new("draft email to bob", AgentRole::EmailAgent)]);
        let (key, _) = state.plan.next_pending().unwrap();
        state.plan.start(key).unwrap();
        state
            .context
            .insert("draft email to bob".into(), "Draft created (draft-1)".into());
        let decision = ReplanDecision {
            status: WorkflowStatus::Continue,
            step_status: Some(StepVerdict::Completed),
            new_steps: vec![],
            final_response: String::new(),
        };
        let out = apply_decision(&mut state, Some(key), decision).unwrap();
        assert_eq!(out.status, WorkflowStatus::Finished);
        assert!(state.final_response.contains("Draft created (draft-1)"));
    }

    #[test]
    fn test_model_finished_with_pending_steps_keeps_going() {
        let (mut state, key) = running_state();
        let decision = ReplanDecision {
            status: WorkflowStatus::Finished,
            step_status: Some(StepVerdict::Completed),
            new_steps: vec![],
            final_response: "done".into(),
        };
        let out = apply_decision(&mut state, Some(key), decision).unwrap();
        assert_eq!(out.status, WorkflowStatus::Continue);
        assert!(state.final_response.is_empty());
    }

    #[test]
    fn test_no_executed_step_inserts_at_front() {
        let mut state = RunState::new("t1", "x");
        state.plan = Plan::from_drafts(vec![StepDraft::new("later", AgentRole::GeneralAgent)]);
        let decision = ReplanDecision {
            status: WorkflowStatus::Continue,
            step_status: None,
            new_steps: vec![StepDraft::new("first", AgentRole::GeneralAgent)],
            final_response: String::new(),
        };
        apply_decision(&mut state, None, decision).unwrap();
        assert_eq!(state.plan.steps()[0].description, "first");
    }

    #[tokio::test]
    async fn test_replanning_failure_degrades_to_raw_output() {
        let (mut state, key) = running_state();
        state.last_tool_output = "Found 3 hotels in Lisbon".into();
        let replanner = Replanner::new(Arc::new(ScriptedLlmClient::new().reply("not json")), "sys", 10);
        let out = replanner.replan(&mut state).await;
        assert_eq!(out.status, WorkflowStatus::Failed);
        assert_eq!(state.final_response, "Found 3 hotels in Lisbon");
        // 步骤保持未结算
        assert_eq!(state.plan.get(key).unwrap().status, StepStatus::InProgress);
    }

    #[tokio::test]
    async fn test_prompt_contains_plan_and_output() {
        let (mut state, _) = running_state();
        state.last_tool_output = "Found 3 hotels".into();
        let llm = Arc::new(ScriptedLlmClient::new().reply(
            r#"{"status": "CONTINUE", "step_status": "completed", "new_steps": [], "final_response": ""}"#,
        ));
        let replanner = Replanner::new(llm.clone(), "sys", 10);
        let out = replanner.replan(&mut state).await;
        assert_eq!(out.status, WorkflowStatus::Continue);
        assert_eq!(out.resolved.unwrap().status, StepStatus::Completed);
        let prompt = &llm.requests()[0].messages[1].content;
        assert!(prompt.contains("1. [in_progress] search hotels in Lisbon (BookingAgent)"));
        assert!(prompt.contains("Current Step: 1. search hotels in Lisbon (BookingAgent)"));
        assert!(prompt.contains("Tool Output:\nFound 3 hotels"));
    }
}
