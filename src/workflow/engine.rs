//! 工作流驱动
//!
//! 以 thread_id 为单位运行 Planner/Analyzer → Supervisor → Worker → Replanner 循环：
//! 每经过一个节点写一次检查点；Worker 请求人工输入时暂停并返回问题，
//! 之后带着回答从同一 Worker、同一迭代继续。同一线程的调用按到达顺序串行，
//! 不同线程并发执行，只共享存储。

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::stream::{self, StreamExt};
use serde::Serialize;

use crate::agents::{
    route, Analyzer, EventSink, InboundEmail, PlanOutcome, Planner, Replanner, Route, RunEvent, Worker,
    WorkerOutcome, WorkerPause,
};
use crate::core::{AgentError, Checkpoint, RunOrigin, RunPhase, Suspension, ThreadLocks};
use crate::llm::{AgentUsage, ModelSlot, UsageTracker};
use crate::memory::{LongTermMemory, MemoryExtractor, Message};
use crate::store::{
    CheckpointStore, InterruptRegistry, InterruptStatus, PendingInterrupt, StateUpdate, ThreadSummary,
};
use crate::workflow::{AgentRole, Node, Plan, PlanStep, StepKey, WorkflowStatus};

/// 回复类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyKind {
    Ai,
    Interrupt,
}

/// 一次调用的对外结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReply {
    #[serde(rename = "type")]
    pub kind: ReplyKind,
    /// 最终回复，或暂停时的问题
    pub response: String,
    pub plan: Vec<PlanStep>,
    pub thread_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow_status: Option<WorkflowStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interrupt_id: Option<String>,
}

impl RunReply {
    fn from_checkpoint(cp: &Checkpoint) -> Self {
        let (kind, response, workflow_status) = match &cp.phase {
            RunPhase::Suspended(s) => (ReplyKind::Interrupt, s.question.clone(), None),
            _ => (
                ReplyKind::Ai,
                cp.state.final_response.clone(),
                Some(cp.state.workflow_status),
            ),
        };
        Self {
            kind,
            response,
            plan: cp.state.plan.steps(),
            thread_id: cp.state.thread_id.clone(),
            workflow_status,
            interrupt_id: cp.interrupt_id.clone(),
        }
    }

    pub fn is_interrupt(&self) -> bool {
        self.kind == ReplyKind::Interrupt
    }
}

/// 编排器：由 `WorkflowBuilder` 构建
pub struct Workflow {
    pub(crate) planner: Planner,
    pub(crate) analyzer: Analyzer,
    pub(crate) replanner: Replanner,
    pub(crate) workers: HashMap<AgentRole, Worker>,
    pub(crate) checkpoints: Arc<dyn CheckpointStore>,
    pub(crate) interrupts: Arc<dyn InterruptRegistry>,
    pub(crate) memory: Arc<dyn LongTermMemory>,
    pub(crate) extractor: Option<MemoryExtractor>,
    pub(crate) events: EventSink,
    pub(crate) locks: ThreadLocks,
    pub(crate) max_node_visits: usize,
    pub(crate) top_k: usize,
    pub(crate) inbox_concurrency: usize,
    pub(crate) usage: Arc<UsageTracker>,
}

impl Workflow {
    /// 处理一条用户消息；线程正在等待回答时，该消息即为回答
    pub async fn start(&self, input: &str, thread_id: Option<&str>) -> Result<RunReply, AgentError> {
        let thread_id = thread_id
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let _guard = self.locks.acquire(&thread_id).await;

        let previous = self.checkpoints.get_state(&thread_id).await?;
        if let Some(cp) = previous.as_ref().filter(|cp| cp.suspension().is_some()) {
            tracing::info!(thread_id = %thread_id, "thread is waiting for input, treating message as the answer");
            return self.drive(cp.clone(), Some(input.to_string())).await;
        }

        let cp = Checkpoint::fresh_request(previous, &thread_id, input, Node::Planner, RunOrigin::Manual);
        self.drive(cp, None).await
    }

    /// 带着回答恢复暂停的线程
    pub async fn resume(&self, thread_id: &str, answer: &str) -> Result<RunReply, AgentError> {
        let _guard = self.locks.acquire(thread_id).await;
        let cp = self.suspended_checkpoint(thread_id).await?;
        self.drive(cp, Some(answer.to_string())).await
    }

    /// 从最近检查点记录的节点继续（例如进程中途退出后）
    pub async fn continue_thread(&self, thread_id: &str) -> Result<RunReply, AgentError> {
        let _guard = self.locks.acquire(thread_id).await;
        let cp = self
            .checkpoints
            .get_state(thread_id)
            .await?
            .ok_or_else(|| AgentError::ThreadNotFound(thread_id.to_string()))?;
        match cp.phase {
            RunPhase::Suspended(_) => Err(AgentError::AwaitingInput(thread_id.to_string())),
            RunPhase::Done => Ok(RunReply::from_checkpoint(&cp)),
            RunPhase::Ready { .. } => self.drive(cp, None).await,
        }
    }

    /// 线程当前等待回答的问题（无副作用，不加锁）
    pub async fn pending_question(&self, thread_id: &str) -> Result<Option<String>, AgentError> {
        Ok(self
            .checkpoints
            .get_state(thread_id)
            .await?
            .and_then(|cp| cp.suspension().map(|s| s.question.clone())))
    }

    pub async fn thread_state(&self, thread_id: &str) -> Result<Option<Checkpoint>, AgentError> {
        Ok(self.checkpoints.get_state(thread_id).await?)
    }

    pub async fn list_threads(&self) -> Result<Vec<ThreadSummary>, AgentError> {
        Ok(self.checkpoints.list_threads().await?)
    }

    /// 以 Analyzer 为入口处理一封来信（每封信一个新线程）
    pub async fn process_email(&self, email: InboundEmail) -> Result<RunReply, AgentError> {
        let thread_id = uuid::Uuid::new_v4().to_string();
        let _guard = self.locks.acquire(&thread_id).await;

        let source = serde_json::to_value(&email).unwrap_or(serde_json::Value::Null);
        let mut cp = Checkpoint::fresh_request(
            None,
            &thread_id,
            &email.to_input(),
            Node::Analyzer,
            RunOrigin::Inbox { source },
        );
        cp.state
            .context
            .insert("source_email".to_string(), email.summary());
        tracing::info!(thread_id = %thread_id, "processing inbound email: {}", email.subject);
        self.drive(cp, None).await
    }

    /// 批量处理来信，最多 `concurrency` 个线程同时运行；结果与输入顺序一致
    pub async fn process_inbox(
        &self,
        emails: Vec<InboundEmail>,
        concurrency: Option<usize>,
    ) -> Vec<Result<RunReply, AgentError>> {
        let limit = concurrency.unwrap_or(self.inbox_concurrency).max(1);
        stream::iter(emails)
            .map(|email| self.process_email(email))
            .buffered(limit)
            .collect()
            .await
    }

    /// 回答一条待处理中断；运行结束后该中断被标记为 resolved
    pub async fn resolve_interrupt(&self, interrupt_id: &str, answer: &str) -> Result<RunReply, AgentError> {
        let thread_id = self.open_interrupt(interrupt_id).await?.thread_id;
        let _guard = self.locks.acquire(&thread_id).await;
        // 等锁期间可能已被回答或跳过
        self.open_interrupt(interrupt_id).await?;
        let cp = self.suspended_checkpoint(&thread_id).await?;
        self.drive(cp, Some(answer.to_string())).await
    }

    /// 跳过一条待处理中断，线程以 FINISHED 结束
    pub async fn dismiss_interrupt(&self, interrupt_id: &str) -> Result<(), AgentError> {
        let thread_id = self.open_interrupt(interrupt_id).await?.thread_id;
        let _guard = self.locks.acquire(&thread_id).await;
        let item = self.open_interrupt(interrupt_id).await?;
        self.suspended_checkpoint(&thread_id).await?;
        self.interrupts.dismiss(interrupt_id).await?;
        let response = format!("Dismissed: {}", item.question);
        self.checkpoints
            .update_state(
                &thread_id,
                StateUpdate {
                    phase: Some(RunPhase::Done),
                    workflow_status: Some(WorkflowStatus::Finished),
                    final_response: Some(response.clone()),
                    append_messages: vec![Message::assistant(&response)],
                },
            )
            .await?;
        tracing::info!(thread_id = %thread_id, interrupt_id, "interrupt dismissed");
        Ok(())
    }

    pub async fn list_pending(&self) -> Result<Vec<PendingInterrupt>, AgentError> {
        Ok(self.interrupts.list_pending(Some(InterruptStatus::Pending)).await?)
    }

    /// 各组件累计 token 用量（仅含有过请求的组件）
    pub fn token_usage(&self) -> Vec<(ModelSlot, AgentUsage)> {
        self.usage.snapshot()
    }

    async fn open_interrupt(&self, interrupt_id: &str) -> Result<PendingInterrupt, AgentError> {
        let item = self
            .interrupts
            .get_pending(interrupt_id)
            .await?
            .ok_or_else(|| AgentError::InterruptNotFound(interrupt_id.to_string()))?;
        if item.status != InterruptStatus::Pending {
            return Err(AgentError::InterruptClosed(
                interrupt_id.to_string(),
                item.status.to_string(),
            ));
        }
        Ok(item)
    }

    async fn suspended_checkpoint(&self, thread_id: &str) -> Result<Checkpoint, AgentError> {
        let cp = self
            .checkpoints
            .get_state(thread_id)
            .await?
            .ok_or_else(|| AgentError::ThreadNotFound(thread_id.to_string()))?;
        if cp.suspension().is_none() {
            return Err(AgentError::NotSuspended(thread_id.to_string()));
        }
        Ok(cp)
    }

    /// 主循环：执行节点直到暂停或结束，每个节点后写检查点
    async fn drive(&self, mut cp: Checkpoint, mut answer: Option<String>) -> Result<RunReply, AgentError> {
        let events = self.events.for_thread(&cp.state.thread_id);
        cp.touch();
        self.checkpoints.put_state(&cp).await?;

        loop {
            let next_phase = match cp.phase.clone() {
                RunPhase::Done => break,
                RunPhase::Suspended(suspension) => match answer.take() {
                    Some(answer) => {
                        cp.node_visits += 1;
                        self.resume_worker(&mut cp, suspension, &answer, &events).await
                    }
                    None => break,
                },
                RunPhase::Ready { next } => {
                    if cp.node_visits >= self.max_node_visits {
                        self.stop_runaway(&mut cp)
                    } else {
                        cp.node_visits += 1;
                        tracing::info!(thread_id = %cp.state.thread_id, visit = cp.node_visits, "node {}", next);
                        self.run_node(&mut cp, next, &events).await?
                    }
                }
            };

            match &next_phase {
                RunPhase::Suspended(s) => self.on_suspend(&mut cp, s, &events).await?,
                RunPhase::Done => self.conclude(&mut cp, &events).await?,
                RunPhase::Ready { .. } => {}
            }
            cp.phase = next_phase;
            cp.touch();
            self.checkpoints.put_state(&cp).await?;
        }

        Ok(RunReply::from_checkpoint(&cp))
    }

    async fn run_node(&self, cp: &mut Checkpoint, node: Node, events: &EventSink) -> Result<RunPhase, AgentError> {
        match node {
            Node::Planner => Ok(self.planner_node(cp, events).await),
            Node::Analyzer => Ok(self.analyzer_node(cp, events).await),
            Node::Supervisor => self.supervisor_node(cp, events),
            Node::Replanner => Ok(self.replanner_node(cp, events).await),
            Node::EmailAgent | Node::BookingAgent | Node::GeneralAgent => {
                Ok(self.worker_node(cp, node, events).await)
            }
        }
    }

    async fn planner_node(&self, cp: &mut Checkpoint, events: &EventSink) -> RunPhase {
        let state = &mut cp.state;
        let facts = self.retrieve_facts(&state.input).await;
        let history_len = state.messages.len().saturating_sub(1);
        let result = self
            .planner
            .plan(&state.input, &state.messages[..history_len], &facts)
            .await;

        match result {
            Ok(result) => {
                if let Some(emotion) = result.emotion {
                    emotion.record(&state.thread_id);
                    state.emotion = Some(emotion);
                }
                match result.outcome {
                    PlanOutcome::Conversational { response } => {
                        state.plan = Plan::default();
                        state.workflow_status = WorkflowStatus::Finished;
                        state.final_response = response;
                        RunPhase::Done
                    }
                    PlanOutcome::Steps(drafts) => {
                        state.plan = Plan::from_drafts(drafts);
                        state.current_step_index = 0;
                        state.workflow_status = WorkflowStatus::Continue;
                        if !state.plan.is_empty() {
                            state.context.clear();
                            events.emit(RunEvent::PlanCreated {
                                steps: state.plan.steps(),
                            });
                        }
                        tracing::info!(thread_id = %state.thread_id, steps = state.plan.len(), "plan created");
                        RunPhase::Ready { next: Node::Supervisor }
                    }
                }
            }
            Err(e) => {
                tracing::warn!(thread_id = %state.thread_id, "planning failed: {}", e);
                state.workflow_status = WorkflowStatus::Failed;
                state.final_response =
                    "Sorry, I had trouble understanding that request. Could you rephrase it?".to_string();
                RunPhase::Done
            }
        }
    }

    async fn analyzer_node(&self, cp: &mut Checkpoint, events: &EventSink) -> RunPhase {
        let state = &mut cp.state;
        match self.analyzer.analyze(&state.input).await {
            Ok(drafts) if drafts.is_empty() => {
                tracing::info!(thread_id = %state.thread_id, "email ignored");
                state.workflow_status = WorkflowStatus::Finished;
                state.final_response = "Message ignored (irrelevant)".to_string();
                RunPhase::Done
            }
            Ok(drafts) => {
                state.plan = Plan::from_drafts(drafts);
                state.current_step_index = 0;
                state.workflow_status = WorkflowStatus::Continue;
                events.emit(RunEvent::PlanCreated {
                    steps: state.plan.steps(),
                });
                RunPhase::Ready { next: Node::Supervisor }
            }
            Err(e) => {
                tracing::warn!(thread_id = %state.thread_id, "email analysis failed: {}", e);
                state.workflow_status = WorkflowStatus::Failed;
                state.final_response = format!("Error analyzing message: {}", e);
                RunPhase::Done
            }
        }
    }

    fn supervisor_node(&self, cp: &mut Checkpoint, events: &EventSink) -> Result<RunPhase, AgentError> {
        let state = &mut cp.state;
        let routed = route(&mut state.plan).map_err(|e| {
            tracing::error!(thread_id = %state.thread_id, "supervisor routing failed: {}", e);
            e
        })?;
        Ok(match routed {
            Route::Worker { node, step } => {
                state.current_step_index = step.id.saturating_sub(1) as usize;
                events.emit(RunEvent::StepStarted {
                    step_id: step.id,
                    agent: step.assigned_agent,
                    description: step.description.clone(),
                });
                RunPhase::Ready { next: node }
            }
            Route::Replanner => RunPhase::Ready { next: Node::Replanner },
        })
    }

    async fn worker_node(&self, cp: &mut Checkpoint, node: Node, events: &EventSink) -> RunPhase {
        let state = &mut cp.state;
        let (worker, (key, step)) = match (self.worker_for(node), state.plan.in_progress()) {
            (Some(w), Some(found)) => (w, found),
            (_, None) => {
                tracing::warn!(thread_id = %state.thread_id, "{} found no in-progress step", node);
                state.last_tool_output = format!("ERROR: {}", AgentError::MissingInProgressStep);
                return RunPhase::Ready { next: Node::Replanner };
            }
            (None, Some(_)) => {
                state.last_tool_output = format!("ERROR: no worker registered for {}", node);
                return RunPhase::Ready { next: Node::Replanner };
            }
        };
        let outcome = worker.execute(&step, &state.context, events).await;
        self.apply_worker_outcome(cp, node, key, outcome)
    }

    async fn resume_worker(
        &self,
        cp: &mut Checkpoint,
        suspension: Suspension,
        answer: &str,
        events: &EventSink,
    ) -> RunPhase {
        cp.state.messages.push(Message::user(answer));
        let Some(worker) = self.worker_for(suspension.node) else {
            cp.state.last_tool_output = format!("ERROR: no worker registered for {}", suspension.node);
            return RunPhase::Ready { next: Node::Replanner };
        };
        let pause = WorkerPause {
            iteration: suspension.iteration,
            transcript: suspension.transcript,
            question: suspension.question,
        };
        let outcome = worker.resume(pause, answer, events).await;
        self.apply_worker_outcome(cp, suspension.node, suspension.step_key, outcome)
    }

    fn apply_worker_outcome(&self, cp: &mut Checkpoint, node: Node, key: StepKey, outcome: WorkerOutcome) -> RunPhase {
        let state = &mut cp.state;
        match outcome {
            WorkerOutcome::Completed(result) => {
                match state.plan.get(key) {
                    Some(step) => {
                        state.context.insert(step.description, result.clone());
                    }
                    None => tracing::warn!(thread_id = %state.thread_id, "step {} vanished from the plan", key),
                }
                state.last_tool_output = result;
                RunPhase::Ready { next: Node::Replanner }
            }
            WorkerOutcome::NeedsInput(pause) => RunPhase::Suspended(Suspension {
                node,
                step_key: key,
                iteration: pause.iteration,
                transcript: pause.transcript,
                question: pause.question,
            }),
        }
    }

    async fn replanner_node(&self, cp: &mut Checkpoint, events: &EventSink) -> RunPhase {
        let outcome = self.replanner.replan(&mut cp.state).await;
        if let Some(step) = &outcome.resolved {
            events.emit(RunEvent::StepResolved {
                step_id: step.id,
                status: step.status,
            });
        }
        tracing::info!(
            thread_id = %cp.state.thread_id,
            status = %outcome.status,
            inserted = outcome.inserted,
            "replanned"
        );
        match outcome.status {
            WorkflowStatus::Continue => RunPhase::Ready { next: Node::Supervisor },
            WorkflowStatus::Finished | WorkflowStatus::Failed => RunPhase::Done,
        }
    }

    /// 超过节点访问上限：以 FAILED 结束并说明原因
    fn stop_runaway(&self, cp: &mut Checkpoint) -> RunPhase {
        let state = &mut cp.state;
        tracing::warn!(
            thread_id = %state.thread_id,
            "node visit limit of {} reached, stopping run",
            self.max_node_visits
        );
        state.workflow_status = WorkflowStatus::Failed;
        let last = if state.last_tool_output.is_empty() {
            String::new()
        } else {
            format!(" Last result: {}", state.last_tool_output)
        };
        state.final_response = format!(
            "I stopped after {} steps without finishing your request; the plan kept changing without making progress.{}",
            self.max_node_visits, last
        );
        RunPhase::Done
    }

    async fn on_suspend(&self, cp: &mut Checkpoint, suspension: &Suspension, events: &EventSink) -> Result<(), AgentError> {
        tracing::info!(thread_id = %cp.state.thread_id, node = %suspension.node, "waiting for input: {}", suspension.question);
        cp.state.messages.push(Message::assistant(&suspension.question));
        events.emit(RunEvent::Interrupted {
            question: suspension.question.clone(),
        });

        if let RunOrigin::Inbox { source } = &cp.origin {
            match &cp.interrupt_id {
                Some(id) => self.interrupts.update_question(id, &suspension.question).await?,
                None => {
                    let item = PendingInterrupt::new(&cp.state.thread_id, &suspension.question, source.clone());
                    self.interrupts.save_pending(&item).await?;
                    cp.interrupt_id = Some(item.id);
                }
            }
        }
        Ok(())
    }

    /// 运行结束：记录回复、结算中断、抽取长期事实
    async fn conclude(&self, cp: &mut Checkpoint, events: &EventSink) -> Result<(), AgentError> {
        let state = &mut cp.state;
        if !state.final_response.is_empty() {
            state.messages.push(Message::assistant(&state.final_response));
        }
        tracing::info!(thread_id = %state.thread_id, status = %state.workflow_status, "run finished");
        events.emit(RunEvent::Finished {
            status: state.workflow_status,
            response: state.final_response.clone(),
        });

        if let Some(id) = &cp.interrupt_id {
            self.interrupts.resolve(id).await?;
        }

        if let Some(extractor) = &self.extractor {
            extractor
                .extract_and_store(&cp.state.thread_id, &cp.state.messages)
                .await;
        }
        Ok(())
    }

    async fn retrieve_facts(&self, query: &str) -> Vec<String> {
        if !self.memory.enabled() || self.top_k == 0 {
            return Vec::new();
        }
        match self.memory.retrieve(query, self.top_k, None).await {
            Ok(facts) => facts,
            Err(e) => {
                tracing::warn!("long-term memory retrieval failed: {}", e);
                Vec::new()
            }
        }
    }

    fn worker_for(&self, node: Node) -> Option<&Worker> {
        node.worker_role().and_then(|role| self.workers.get(&role))
    }
}
