//! 工作流集成测试：规划 → 路由 → 执行 → 重规划的端到端场景

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use steward::agents::{InboundEmail, RunEvent};
use steward::config::{AppConfig, StorageBackend};
use steward::core::{AgentError, Checkpoint, RunOrigin, RunPhase};
use steward::llm::{Generation, LlmClient, LlmError, MockLlmClient, ModelSlot, ScriptedLlmClient, ToolSpec};
use steward::memory::Message;
use steward::store::{
    CheckpointStore, InterruptRegistry, InterruptStatus, MemoryCheckpointStore, MemoryInterruptRegistry,
    SqliteStore,
};
use steward::tools::SandboxMailbox;
use steward::workflow::{
    AgentRole, Node, Plan, ReplyKind, StepDraft, StepStatus, Workflow, WorkflowBuilder, WorkflowStatus,
};
use tokio::sync::mpsc;

fn config() -> AppConfig {
    let mut cfg = AppConfig::default();
    cfg.storage.backend = StorageBackend::Memory;
    cfg.memory.enabled = false;
    cfg
}

/// 每个组件一个脚本化模型
#[derive(Clone)]
struct Models {
    planner: Arc<ScriptedLlmClient>,
    analyzer: Arc<ScriptedLlmClient>,
    replanner: Arc<ScriptedLlmClient>,
    email: Arc<ScriptedLlmClient>,
    booking: Arc<ScriptedLlmClient>,
    general: Arc<ScriptedLlmClient>,
}

impl Default for Models {
    fn default() -> Self {
        Self {
            planner: Arc::new(ScriptedLlmClient::new()),
            analyzer: Arc::new(ScriptedLlmClient::new()),
            replanner: Arc::new(ScriptedLlmClient::new()),
            email: Arc::new(ScriptedLlmClient::new()),
            booking: Arc::new(ScriptedLlmClient::new()),
            general: Arc::new(ScriptedLlmClient::new()),
        }
    }
}

impl Models {
    fn builder(&self, cfg: AppConfig) -> WorkflowBuilder {
        WorkflowBuilder::new(cfg)
            .with_llm(ModelSlot::Planner, self.planner.clone())
            .with_llm(ModelSlot::Analyzer, self.analyzer.clone())
            .with_llm(ModelSlot::Replanner, self.replanner.clone())
            .with_llm(ModelSlot::EmailAgent, self.email.clone())
            .with_llm(ModelSlot::BookingAgent, self.booking.clone())
            .with_llm(ModelSlot::GeneralAgent, self.general.clone())
    }

    fn build(&self) -> Workflow {
        self.builder(config()).build().unwrap()
    }

    fn worker_calls(&self) -> usize {
        self.email.calls() + self.booking.calls() + self.general.calls()
    }
}

/// 每次生成前先等待，模拟慢模型
struct SlowLlm {
    inner: Arc<ScriptedLlmClient>,
    delay: Duration,
}

#[async_trait]
impl LlmClient for SlowLlm {
    async fn generate(&self, messages: &[Message], tools: &[ToolSpec]) -> Result<Generation, LlmError> {
        tokio::time::sleep(self.delay).await;
        self.inner.generate(messages, tools).await
    }
}

fn plan_json(steps: &[(&str, &str)]) -> String {
    let steps: Vec<_> = steps
        .iter()
        .map(|(d, a)| json!({"description": d, "assigned_agent": a}))
        .collect();
    json!({"is_conversational": false, "direct_response": "", "steps": steps}).to_string()
}

fn replan_json(status: &str, step_status: &str, new_steps: &[(&str, &str)], final_response: &str) -> String {
    let new_steps: Vec<_> = new_steps
        .iter()
        .map(|(d, a)| json!({"description": d, "assigned_agent": a}))
        .collect();
    json!({
        "status": status,
        "step_status": step_status,
        "new_steps": new_steps,
        "final_response": final_response,
    })
    .to_string()
}

fn email(subject: &str, body: &str) -> InboundEmail {
    InboundEmail {
        subject: subject.to_string(),
        sender: "ana@example.com".to_string(),
        body: body.to_string(),
    }
}

#[tokio::test]
async fn test_conversational_reply_runs_no_worker() {
    let models = Models {
        planner: Arc::new(ScriptedLlmClient::new().reply(
            r#"{"is_conversational": true, "direct_response": "I'm doing well, thanks for asking!", "steps": []}"#,
        )),
        ..Default::default()
    };
    let wf = models.build();

    let reply = wf.start("Hi, how are you?", None).await.unwrap();
    assert_eq!(reply.kind, ReplyKind::Ai);
    assert_eq!(reply.workflow_status, Some(WorkflowStatus::Finished));
    assert_eq!(reply.response, "I'm doing well, thanks for asking!");
    assert!(reply.plan.is_empty());
    assert_eq!(models.worker_calls(), 0);
    assert_eq!(models.replanner.calls(), 0);

    let state = wf.thread_state(&reply.thread_id).await.unwrap().unwrap();
    assert_eq!(state.phase, RunPhase::Done);
    assert_eq!(state.state.messages.len(), 2);
}

#[tokio::test]
async fn test_draft_email_end_to_end() {
    let models = Models {
        planner: Arc::new(ScriptedLlmClient::new().reply(plan_json(&[(
            "Draft an email to bob@example.com about the Q3 report",
            "EmailAgent",
        )]))),
        email: Arc::new(
            ScriptedLlmClient::new()
                .tool_call(
                    "email_draft",
                    json!({"recipient": "bob@example.com", "subject": "Q3 report", "body": "Hi Bob, ..."}),
                )
                .reply("Draft created for bob@example.com with subject 'Q3 report'."),
        ),
        replanner: Arc::new(ScriptedLlmClient::new().reply(replan_json(
            "FINISHED",
            "completed",
            &[],
            "I drafted the Q3 report email to bob@example.com; it is waiting in your drafts.",
        ))),
        ..Default::default()
    };
    let mailbox = Arc::new(SandboxMailbox::new("me@example.com"));
    let (tx, mut rx) = mpsc::unbounded_channel();
    let wf = models
        .builder(config())
        .with_email_service(mailbox.clone())
        .with_events(tx)
        .build()
        .unwrap();

    let reply = wf
        .start("Draft an email to bob@example.com about the Q3 report", Some("t-b"))
        .await
        .unwrap();
    assert_eq!(reply.workflow_status, Some(WorkflowStatus::Finished));
    assert!(reply.response.contains("drafted"));
    assert_eq!(reply.plan.len(), 1);
    assert_eq!(reply.plan[0].status, StepStatus::Completed);
    assert_eq!(mailbox.drafts().await.len(), 1);
    assert!(mailbox.sent().await.is_empty());

    let mut kinds = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        assert_eq!(ev.thread_id, "t-b");
        kinds.push(match ev.event {
            RunEvent::PlanCreated { .. } => "plan",
            RunEvent::StepStarted { .. } => "start",
            RunEvent::ToolCall { .. } => "call",
            RunEvent::ToolResult { ok, .. } => {
                assert!(ok);
                "result"
            }
            RunEvent::StepResolved { status, .. } => {
                assert_eq!(status, StepStatus::Completed);
                "resolved"
            }
            RunEvent::Finished { .. } => "finished",
            _ => "other",
        });
    }
    assert_eq!(kinds, vec!["plan", "start", "call", "result", "resolved", "finished"]);
}

fn booking_interrupt_models() -> Models {
    Models {
        planner: Arc::new(ScriptedLlmClient::new().reply(plan_json(&[("Book a hotel", "BookingAgent")]))),
        booking: Arc::new(
            ScriptedLlmClient::new()
                .reply("[NEED_INPUT] Which city and check-in date?")
                .tool_call("search_hotels", json!({"location": "Porto", "date": "2025-05-01"}))
                .tool_call("book_hotel", json!({"hotel_id": "HTL-CS"}))
                .reply("Booked City Stay in Porto, confirmation HTL-67890."),
        ),
        replanner: Arc::new(ScriptedLlmClient::new().reply(replan_json(
            "FINISHED",
            "completed",
            &[],
            "Your hotel is booked: City Stay, confirmation HTL-67890.",
        ))),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_missing_details_interrupt_then_resume() {
    let models = booking_interrupt_models();
    let wf = models.build();

    let first = wf.start("book me a hotel", Some("t-c")).await.unwrap();
    assert_eq!(first.kind, ReplyKind::Interrupt);
    assert_eq!(first.response, "Which city and check-in date?");
    assert_eq!(first.workflow_status, None);
    assert_eq!(first.plan[0].status, StepStatus::InProgress);
    assert_eq!(
        wf.pending_question("t-c").await.unwrap().as_deref(),
        Some("Which city and check-in date?")
    );
    // 查询无副作用
    assert_eq!(models.booking.calls(), 1);
    assert_eq!(models.replanner.calls(), 0);

    let second = wf.resume("t-c", "Porto, checking in 2025-05-01").await.unwrap();
    assert_eq!(second.kind, ReplyKind::Ai);
    assert_eq!(second.workflow_status, Some(WorkflowStatus::Finished));
    assert!(second.response.contains("HTL-67890"));
    assert_eq!(second.plan[0].status, StepStatus::Completed);
    assert_eq!(wf.pending_question("t-c").await.unwrap(), None);

    // 恢复后的第一次生成能看到回答，且仍是同一个步骤
    let requests = models.booking.requests();
    let resumed = &requests[1].messages;
    assert_eq!(
        resumed.last().unwrap().content,
        "User provided: Porto, checking in 2025-05-01"
    );
    assert!(resumed[1].content.starts_with("Current Task: Book a hotel"));
    assert_eq!(models.planner.calls(), 1);

    let cp = wf.thread_state("t-c").await.unwrap().unwrap();
    let log: Vec<&str> = cp.state.messages.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(
        log,
        vec![
            "book me a hotel",
            "Which city and check-in date?",
            "Porto, checking in 2025-05-01",
            "Your hotel is booked: City Stay, confirmation HTL-67890.",
        ]
    );
}

#[tokio::test]
async fn test_message_to_suspended_thread_is_the_answer() {
    let models = booking_interrupt_models();
    let wf = models.build();

    wf.start("book me a hotel", Some("t-s")).await.unwrap();
    let reply = wf.start("Porto on May 1st", Some("t-s")).await.unwrap();
    assert_eq!(reply.workflow_status, Some(WorkflowStatus::Finished));
    assert_eq!(models.planner.calls(), 1);
}

#[tokio::test]
async fn test_resume_errors() {
    let models = Models {
        planner: Arc::new(ScriptedLlmClient::new().reply("Hello!")),
        ..Default::default()
    };
    let wf = models.build();
    assert!(matches!(
        wf.resume("nope", "x").await,
        Err(AgentError::ThreadNotFound(_))
    ));
    // 纯文本回复视为对话式回答
    let reply = wf.start("hey", Some("t-r")).await.unwrap();
    assert_eq!(reply.response, "Hello!");
    assert!(matches!(
        wf.resume("t-r", "x").await,
        Err(AgentError::NotSuspended(_))
    ));
}

#[tokio::test]
async fn test_spam_email_is_ignored() {
    let models = Models {
        analyzer: Arc::new(ScriptedLlmClient::new().reply(r#"{"steps": []}"#)),
        ..Default::default()
    };
    let wf = models.build();

    let reply = wf
        .process_email(email("50% off everything!", "Limited time offer"))
        .await
        .unwrap();
    assert_eq!(reply.workflow_status, Some(WorkflowStatus::Finished));
    assert_eq!(reply.response, "Message ignored (irrelevant)");
    assert!(reply.plan.is_empty());
    assert_eq!(models.worker_calls(), 0);
    assert!(wf.list_pending().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_failed_step_gets_corrective_step() {
    let models = Models {
        planner: Arc::new(ScriptedLlmClient::new().reply(plan_json(&[
            ("Search hotels in Lisbon", "BookingAgent"),
            ("Email Ana the hotel options", "EmailAgent"),
        ]))),
        booking: Arc::new(
            ScriptedLlmClient::new()
                .reply("No hotels found in Lisbon.")
                .reply("Found 3 hotels in Almada, next to Lisbon."),
        ),
        email: Arc::new(
            ScriptedLlmClient::new()
                .tool_call(
                    "email_draft",
                    json!({"recipient": "ana@example.com", "subject": "Hotels", "body": "Options in Almada"}),
                )
                .reply("Drafted the hotel options email to Ana."),
        ),
        replanner: Arc::new(
            ScriptedLlmClient::new()
                .reply(replan_json(
                    "CONTINUE",
                    "failed",
                    &[("Search hotels in the nearby area", "BookingAgent")],
                    "",
                ))
                .reply(replan_json("CONTINUE", "completed", &[], ""))
                .reply(replan_json("FINISHED", "completed", &[], "")),
        ),
        ..Default::default()
    };
    let wf = models.build();

    let reply = wf
        .start("Find me a hotel in Lisbon and email Ana the options", Some("t-e"))
        .await
        .unwrap();

    let ids: Vec<u32> = reply.plan.iter().map(|s| s.id).collect();
    assert_eq!(ids, vec![1, 2, 3]);
    let descriptions: Vec<&str> = reply.plan.iter().map(|s| s.description.as_str()).collect();
    assert_eq!(
        descriptions,
        vec![
            "Search hotels in Lisbon",
            "Search hotels in the nearby area",
            "Email Ana the hotel options",
        ]
    );
    let statuses: Vec<StepStatus> = reply.plan.iter().map(|s| s.status).collect();
    assert_eq!(
        statuses,
        vec![StepStatus::Failed, StepStatus::Completed, StepStatus::Completed]
    );
    assert_eq!(reply.workflow_status, Some(WorkflowStatus::Finished));
    // 模型未给出最终回复，按计划顺序汇总
    assert!(reply.response.contains("Found 3 hotels in Almada"));
    assert!(reply.response.contains("Drafted the hotel options email to Ana."));

    // 第二次重规划时纠正步骤排在第 2 位且正在执行
    let second = &models.replanner.requests()[1].messages[1].content;
    assert!(second.contains("2. [in_progress] Search hotels in the nearby area (BookingAgent)"));
    assert!(second.contains("3. [pending] Email Ana the hotel options (EmailAgent)"));
}

#[tokio::test]
async fn test_n_steps_run_exactly_n_cycles() {
    let models = Models {
        planner: Arc::new(ScriptedLlmClient::new().reply(plan_json(&[
            ("Check what time it is", "GeneralAgent"),
            ("Add a dentist reminder", "GeneralAgent"),
            ("List today's calendar", "GeneralAgent"),
        ]))),
        general: Arc::new(
            ScriptedLlmClient::new()
                .reply("It is 09:00.")
                .reply("Reminder added.")
                .reply("Dentist at 15:00."),
        ),
        replanner: Arc::new(
            ScriptedLlmClient::new()
                .reply(replan_json("CONTINUE", "completed", &[], ""))
                .reply(replan_json("CONTINUE", "completed", &[], ""))
                .reply(replan_json("CONTINUE", "completed", &[], "")),
        ),
        ..Default::default()
    };
    let wf = models.build();

    let reply = wf.start("morning routine", None).await.unwrap();
    assert_eq!(reply.workflow_status, Some(WorkflowStatus::Finished));
    assert_eq!(models.general.calls(), 3);
    assert_eq!(models.replanner.calls(), 3);
    assert!(reply.plan.iter().all(|s| s.status == StepStatus::Completed));
    let first = reply.response.find("It is 09:00.").unwrap();
    let last = reply.response.find("Dentist at 15:00.").unwrap();
    assert!(first < last);
}

#[tokio::test]
async fn test_endless_replanning_is_stopped() {
    let models = Models {
        planner: Arc::new(ScriptedLlmClient::new().reply(plan_json(&[("Find a free slot", "GeneralAgent")]))),
        general: Arc::new(ScriptedLlmClient::new().repeating(Generation::text("Still nothing."))),
        replanner: Arc::new(ScriptedLlmClient::new().repeating(Generation::text(replan_json(
            "CONTINUE",
            "failed",
            &[("Try another slot", "GeneralAgent")],
            "",
        )))),
        ..Default::default()
    };
    let mut cfg = config();
    cfg.workflow.max_node_visits = 10;
    let wf = models.builder(cfg).build().unwrap();

    let reply = wf.start("find me a free slot", None).await.unwrap();
    assert_eq!(reply.workflow_status, Some(WorkflowStatus::Failed));
    assert!(reply.response.contains("stopped after 10 steps"));
    assert!(reply.response.contains("Still nothing."));
    let in_progress = reply
        .plan
        .iter()
        .filter(|s| s.status == StepStatus::InProgress)
        .count();
    assert!(in_progress <= 1);
}

#[tokio::test]
async fn test_planning_failure_is_polite() {
    let models = Models {
        planner: Arc::new(ScriptedLlmClient::new().reply(plan_json(&[("call mom", "PhoneAgent")]))),
        ..Default::default()
    };
    let wf = models.build();
    let reply = wf.start("call mom", None).await.unwrap();
    assert_eq!(reply.workflow_status, Some(WorkflowStatus::Failed));
    assert!(reply.response.contains("rephrase"));
    assert_eq!(models.worker_calls(), 0);
}

#[tokio::test]
async fn test_replanning_failure_surfaces_raw_output() {
    let models = Models {
        planner: Arc::new(ScriptedLlmClient::new().reply(plan_json(&[("What time is it", "GeneralAgent")]))),
        general: Arc::new(ScriptedLlmClient::new().reply("It is 10:30 in Lisbon.")),
        replanner: Arc::new(ScriptedLlmClient::new().fail("service unavailable")),
        ..Default::default()
    };
    let wf = models.build();
    let reply = wf.start("what time is it", None).await.unwrap();
    assert_eq!(reply.workflow_status, Some(WorkflowStatus::Failed));
    assert_eq!(reply.response, "It is 10:30 in Lisbon.");
}

fn inbox_interrupt_models() -> Models {
    Models {
        analyzer: Arc::new(
            ScriptedLlmClient::new()
                .reply(r#"{"steps": [{"description": "Reply to Ana about dinner", "assigned_agent": "EmailAgent"}]}"#),
        ),
        email: Arc::new(
            ScriptedLlmClient::new()
                .reply("[NEED_INPUT] Which evening works for you?")
                .tool_call(
                    "email_draft",
                    json!({"recipient": "ana@example.com", "subject": "Re: Dinner", "body": "Friday works!"}),
                )
                .reply("Drafted a reply to Ana proposing Friday."),
        ),
        replanner: Arc::new(ScriptedLlmClient::new().reply(replan_json(
            "FINISHED",
            "completed",
            &[],
            "Drafted a reply to Ana proposing Friday.",
        ))),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_inbox_interrupt_is_registered_and_resolved() {
    let models = inbox_interrupt_models();
    let registry = Arc::new(MemoryInterruptRegistry::new());
    let wf = models
        .builder(config())
        .with_interrupts(registry.clone())
        .build()
        .unwrap();

    let reply = wf
        .process_email(email("Dinner", "Are you free for dinner this week?"))
        .await
        .unwrap();
    assert_eq!(reply.kind, ReplyKind::Interrupt);
    let interrupt_id = reply.interrupt_id.clone().unwrap();

    let pending = wf.list_pending().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, interrupt_id);
    assert_eq!(pending[0].question, "Which evening works for you?");
    assert_eq!(pending[0].source_context["subject"], "Dinner");

    let cp = wf.thread_state(&reply.thread_id).await.unwrap().unwrap();
    assert_eq!(
        cp.state.context.get("source_email").map(String::as_str),
        Some("Subject: Dinner; From: ana@example.com")
    );

    let done = wf.resolve_interrupt(&interrupt_id, "Friday").await.unwrap();
    assert_eq!(done.workflow_status, Some(WorkflowStatus::Finished));
    assert!(wf.list_pending().await.unwrap().is_empty());
    let item = registry.get_pending(&interrupt_id).await.unwrap().unwrap();
    assert_eq!(item.status, InterruptStatus::Resolved);

    assert!(matches!(
        wf.resolve_interrupt(&interrupt_id, "again").await,
        Err(AgentError::InterruptClosed(_, _))
    ));
    assert!(matches!(
        wf.resolve_interrupt("missing", "x").await,
        Err(AgentError::InterruptNotFound(_))
    ));
}

#[tokio::test]
async fn test_dismissed_interrupt_finishes_thread() {
    let models = inbox_interrupt_models();
    let wf = models.build();

    let reply = wf
        .process_email(email("Dinner", "Are you free for dinner this week?"))
        .await
        .unwrap();
    let interrupt_id = reply.interrupt_id.unwrap();
    wf.dismiss_interrupt(&interrupt_id).await.unwrap();

    assert!(wf.list_pending().await.unwrap().is_empty());
    let cp = wf.thread_state(&reply.thread_id).await.unwrap().unwrap();
    assert_eq!(cp.phase, RunPhase::Done);
    assert_eq!(cp.state.workflow_status, WorkflowStatus::Finished);
    assert_eq!(cp.state.final_response, "Dismissed: Which evening works for you?");
    assert_eq!(wf.pending_question(&reply.thread_id).await.unwrap(), None);

    assert!(matches!(
        wf.resolve_interrupt(&interrupt_id, "Friday").await,
        Err(AgentError::InterruptClosed(_, _))
    ));
    assert!(matches!(
        wf.dismiss_interrupt(&interrupt_id).await,
        Err(AgentError::InterruptClosed(_, _))
    ));
    assert_eq!(models.email.calls(), 1);
}

#[tokio::test]
async fn test_dismiss_during_resolve_leaves_result_intact() {
    let models = inbox_interrupt_models();
    let registry = Arc::new(MemoryInterruptRegistry::new());
    let slow_email = Arc::new(SlowLlm {
        inner: models.email.clone(),
        delay: Duration::from_millis(150),
    });
    let wf = models
        .builder(config())
        .with_llm(ModelSlot::EmailAgent, slow_email)
        .with_interrupts(registry.clone())
        .build()
        .unwrap();

    let reply = wf
        .process_email(email("Dinner", "Are you free for dinner this week?"))
        .await
        .unwrap();
    let interrupt_id = reply.interrupt_id.clone().unwrap();

    let (resolved, dismissed) = tokio::join!(wf.resolve_interrupt(&interrupt_id, "Friday"), async {
        tokio::time::sleep(Duration::from_millis(30)).await;
        wf.dismiss_interrupt(&interrupt_id).await
    });

    let resolved = resolved.unwrap();
    assert_eq!(resolved.workflow_status, Some(WorkflowStatus::Finished));
    assert_eq!(resolved.response, "Drafted a reply to Ana proposing Friday.");
    assert!(matches!(dismissed, Err(AgentError::InterruptClosed(_, _))));

    let item = registry.get_pending(&interrupt_id).await.unwrap().unwrap();
    assert_eq!(item.status, InterruptStatus::Resolved);
    let cp = wf.thread_state(&reply.thread_id).await.unwrap().unwrap();
    assert_eq!(cp.phase, RunPhase::Done);
    assert_eq!(cp.state.final_response, "Drafted a reply to Ana proposing Friday.");
    assert_eq!(
        cp.state.messages.last().unwrap().content,
        "Drafted a reply to Ana proposing Friday."
    );
}

#[tokio::test]
async fn test_answer_that_raises_another_question_keeps_one_interrupt() {
    let models = Models {
        analyzer: Arc::new(
            ScriptedLlmClient::new()
                .reply(r#"{"steps": [{"description": "Reply to Ana about dinner", "assigned_agent": "EmailAgent"}]}"#),
        ),
        email: Arc::new(
            ScriptedLlmClient::new()
                .reply("[NEED_INPUT] Which evening works for you?")
                .reply("[NEED_INPUT] Which restaurant should I suggest?")
                .tool_call(
                    "email_draft",
                    json!({"recipient": "ana@example.com", "subject": "Re: Dinner", "body": "Friday at Ramiro?"}),
                )
                .reply("Drafted a reply to Ana: Friday at Ramiro."),
        ),
        replanner: Arc::new(ScriptedLlmClient::new().reply(replan_json(
            "FINISHED",
            "completed",
            &[],
            "Drafted a reply to Ana: Friday at Ramiro.",
        ))),
        ..Default::default()
    };
    let wf = models.build();
    let inbound = email("Dinner", "Are you free for dinner this week?");
    let input = inbound.to_input();

    let first = wf.process_email(inbound).await.unwrap();
    let interrupt_id = first.interrupt_id.clone().unwrap();
    assert_eq!(first.response, "Which evening works for you?");

    let second = wf.resolve_interrupt(&interrupt_id, "Friday").await.unwrap();
    assert_eq!(second.kind, ReplyKind::Interrupt);
    assert_eq!(second.interrupt_id.as_deref(), Some(interrupt_id.as_str()));
    assert_eq!(second.response, "Which restaurant should I suggest?");
    assert_eq!(second.plan[0].status, StepStatus::InProgress);
    let pending = wf.list_pending().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, interrupt_id);
    assert_eq!(pending[0].question, "Which restaurant should I suggest?");

    let done = wf.resolve_interrupt(&interrupt_id, "Ramiro").await.unwrap();
    assert_eq!(done.workflow_status, Some(WorkflowStatus::Finished));
    assert_eq!(done.response, "Drafted a reply to Ana: Friday at Ramiro.");
    assert!(wf.list_pending().await.unwrap().is_empty());

    // 同一步骤经历两次暂停，共四次生成，规划与重规划各一次
    assert_eq!(models.email.calls(), 4);
    assert_eq!(models.analyzer.calls(), 1);
    assert_eq!(models.replanner.calls(), 1);
    let last_request = &models.email.requests()[2].messages;
    assert!(last_request.iter().any(|m| m.content == "User provided: Friday"));
    assert_eq!(last_request.last().unwrap().content, "User provided: Ramiro");
    let email_usage = wf
        .token_usage()
        .into_iter()
        .find(|(slot, _)| *slot == ModelSlot::EmailAgent)
        .map(|(_, u)| u.requests);
    assert_eq!(email_usage, Some(4));

    let cp = wf.thread_state(&done.thread_id).await.unwrap().unwrap();
    let log: Vec<&str> = cp.state.messages.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(
        log,
        vec![
            input.as_str(),
            "Which evening works for you?",
            "Friday",
            "Which restaurant should I suggest?",
            "Ramiro",
            "Drafted a reply to Ana: Friday at Ramiro.",
        ]
    );
}

#[tokio::test]
async fn test_process_inbox_keeps_input_order() {
    let models = Models {
        analyzer: Arc::new(ScriptedLlmClient::new().repeating(Generation::text(r#"{"steps": []}"#))),
        ..Default::default()
    };
    let wf = models.build();
    let results = wf
        .process_inbox(
            vec![email("Newsletter", "..."), email("Sale", "..."), email("Promo", "...")],
            Some(2),
        )
        .await;
    assert_eq!(results.len(), 3);
    let mut threads = Vec::new();
    for r in results {
        let reply = r.unwrap();
        assert_eq!(reply.response, "Message ignored (irrelevant)");
        threads.push(reply.thread_id);
    }
    threads.dedup();
    assert_eq!(threads.len(), 3);
    assert_eq!(wf.list_threads().await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_distinct_threads_run_concurrently() {
    let wf = Arc::new(
        WorkflowBuilder::new(config())
            .with_default_llm(Arc::new(MockLlmClient))
            .build()
            .unwrap(),
    );
    let a = {
        let wf = wf.clone();
        tokio::spawn(async move { wf.start("hello from alpha", Some("alpha")).await })
    };
    let b = {
        let wf = wf.clone();
        tokio::spawn(async move { wf.start("hello from beta", Some("beta")).await })
    };
    let (a, b) = (a.await.unwrap().unwrap(), b.await.unwrap().unwrap());
    assert!(a.response.contains("hello from alpha"));
    assert!(!a.response.contains("beta"));
    assert!(b.response.contains("hello from beta"));
    assert_eq!(wf.list_threads().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_continue_thread_after_crash() {
    let checkpoints = Arc::new(MemoryCheckpointStore::new());
    let mut cp = Checkpoint::fresh_request(None, "t-crash", "check the time", Node::Supervisor, RunOrigin::Manual);
    cp.state.plan = Plan::from_drafts(vec![StepDraft::new("Check the time", AgentRole::GeneralAgent)]);
    checkpoints.put_state(&cp).await.unwrap();

    let models = Models {
        general: Arc::new(ScriptedLlmClient::new().reply("It is noon.")),
        replanner: Arc::new(ScriptedLlmClient::new().reply(replan_json("FINISHED", "completed", &[], "It is noon."))),
        ..Default::default()
    };
    let wf = models
        .builder(config())
        .with_checkpoints(checkpoints.clone())
        .build()
        .unwrap();

    let reply = wf.continue_thread("t-crash").await.unwrap();
    assert_eq!(reply.response, "It is noon.");
    assert_eq!(models.planner.calls(), 0);
    // 已结束的线程再次继续时直接返回结果
    let again = wf.continue_thread("t-crash").await.unwrap();
    assert_eq!(again, reply);
    assert!(matches!(
        wf.continue_thread("unknown").await,
        Err(AgentError::ThreadNotFound(_))
    ));
}

#[tokio::test]
async fn test_sqlite_thread_resumes_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("steward.db");

    let first = Models {
        planner: Arc::new(ScriptedLlmClient::new().reply(plan_json(&[("Book a hotel", "BookingAgent")]))),
        booking: Arc::new(
            ScriptedLlmClient::new()
                .tool_call("search_hotels", json!({"location": "Porto", "date": "2025-05-01"}))
                .reply("[NEED_INPUT] Grand Plaza, City Stay or Budget Inn?"),
        ),
        ..Default::default()
    };
    let thread_id = {
        let wf = first
            .builder(config())
            .with_sqlite(SqliteStore::open(&path).unwrap())
            .build()
            .unwrap();
        let reply = wf.start("book a hotel in Porto for May 1st", None).await.unwrap();
        assert!(reply.is_interrupt());
        reply.thread_id
    };

    let second = Models {
        booking: Arc::new(
            ScriptedLlmClient::new()
                .tool_call("book_hotel", json!({"hotel_id": "HTL-GP"}))
                .reply("Booked Grand Plaza, confirmation HTL-67890."),
        ),
        replanner: Arc::new(ScriptedLlmClient::new().reply(replan_json(
            "FINISHED",
            "completed",
            &[],
            "Grand Plaza is booked (HTL-67890).",
        ))),
        ..Default::default()
    };
    let wf = second
        .builder(config())
        .with_sqlite(SqliteStore::open(&path).unwrap())
        .build()
        .unwrap();
    assert_eq!(
        wf.pending_question(&thread_id).await.unwrap().as_deref(),
        Some("Grand Plaza, City Stay or Budget Inn?")
    );

    let reply = wf.resume(&thread_id, "Grand Plaza").await.unwrap();
    assert_eq!(reply.workflow_status, Some(WorkflowStatus::Finished));
    assert_eq!(reply.response, "Grand Plaza is booked (HTL-67890).");

    // 恢复时带回了暂停前的转录（包括第一次搜索的工具结果）
    let resumed = &second.booking.requests()[0].messages;
    assert!(resumed.iter().any(|m| m.content.contains("Found 3 hotels in Porto")));
    assert_eq!(resumed.last().unwrap().content, "User provided: Grand Plaza");
    assert_eq!(second.planner.calls(), 0);
}
