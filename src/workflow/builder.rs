//! 工作流构建器
//!
//! 按配置组装 Planner / Analyzer / 三个 Worker / Replanner、存储与长期记忆；
//! 测试或嵌入方可以逐项替换（模型、存储、邮件与预订后端、事件通道）。

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::agents::prompts::{self, load_prompt};
use crate::agents::{Analyzer, EventSink, Planner, Replanner, ThreadEvent, Worker};
use crate::config::{AppConfig, SearchBackend, StorageBackend};
use crate::core::{AgentError, ThreadLocks};
use crate::llm::{create_llm_for_slot, LlmClient, ModelSlot, TrackedLlm, UsageTracker};
use crate::memory::{InMemoryLongTerm, LongTermMemory, MemoryExtractor, NoopLongTerm};
use crate::store::{
    CheckpointStore, InterruptRegistry, MemoryCheckpointStore, MemoryInterruptRegistry, SqliteStore,
};
use crate::tools::{
    BookingService, BookingToolbox, DuckDuckGoSearch, EmailService, EmailToolbox, GeneralToolbox,
    MockBookingService, SandboxMailbox, SandboxSearch, SearchService, ToolExecutor, Toolbox,
};
use crate::workflow::engine::Workflow;
use crate::workflow::AgentRole;

/// 沙箱邮箱的默认发件人
const DEFAULT_MAILBOX_OWNER: &str = "me@example.com";

/// 工作流构建器
pub struct WorkflowBuilder {
    config: AppConfig,
    default_llm: Option<Arc<dyn LlmClient>>,
    llms: HashMap<ModelSlot, Arc<dyn LlmClient>>,
    checkpoints: Option<Arc<dyn CheckpointStore>>,
    interrupts: Option<Arc<dyn InterruptRegistry>>,
    memory: Option<Arc<dyn LongTermMemory>>,
    email: Option<Arc<dyn EmailService>>,
    booking: Option<Arc<dyn BookingService>>,
    search: Option<Arc<dyn SearchService>>,
    events: Option<mpsc::UnboundedSender<ThreadEvent>>,
    usage: Arc<UsageTracker>,
}

impl WorkflowBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            default_llm: None,
            llms: HashMap::new(),
            checkpoints: None,
            interrupts: None,
            memory: None,
            email: None,
            booking: None,
            search: None,
            events: None,
            usage: Arc::new(UsageTracker::new()),
        }
    }

    /// 所有未单独指定的组件都使用该模型
    pub fn with_default_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.default_llm = Some(llm);
        self
    }

    /// 为某个组件指定模型
    pub fn with_llm(mut self, slot: ModelSlot, llm: Arc<dyn LlmClient>) -> Self {
        self.llms.insert(slot, llm);
        self
    }

    pub fn with_checkpoints(mut self, store: Arc<dyn CheckpointStore>) -> Self {
        self.checkpoints = Some(store);
        self
    }

    pub fn with_interrupts(mut self, registry: Arc<dyn InterruptRegistry>) -> Self {
        self.interrupts = Some(registry);
        self
    }

    /// 检查点与中断共用一个 SQLite 库
    pub fn with_sqlite(self, store: SqliteStore) -> Self {
        let store = Arc::new(store);
        self.with_checkpoints(store.clone()).with_interrupts(store)
    }

    pub fn with_memory(mut self, memory: Arc<dyn LongTermMemory>) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn with_email_service(mut self, service: Arc<dyn EmailService>) -> Self {
        self.email = Some(service);
        self
    }

    pub fn with_booking_service(mut self, service: Arc<dyn BookingService>) -> Self {
        self.booking = Some(service);
        self
    }

    pub fn with_search_service(mut self, service: Arc<dyn SearchService>) -> Self {
        self.search = Some(service);
        self
    }

    /// 运行事件发往该通道
    pub fn with_events(mut self, tx: mpsc::UnboundedSender<ThreadEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    /// 组件的客户端，外层记录 token 用量
    fn llm(&self, slot: ModelSlot) -> Result<Arc<dyn LlmClient>, AgentError> {
        let inner = match self.llms.get(&slot).or(self.default_llm.as_ref()) {
            Some(llm) => llm.clone(),
            None => create_llm_for_slot(&self.config, slot)?,
        };
        Ok(Arc::new(TrackedLlm::new(slot, inner, self.usage.clone())))
    }

    fn search_service(&self) -> Arc<dyn SearchService> {
        if let Some(search) = &self.search {
            return search.clone();
        }
        match self.config.tools.search_backend {
            SearchBackend::Sandbox => Arc::new(SandboxSearch::new()),
            SearchBackend::DuckDuckGo => {
                tracing::info!("web_search uses DuckDuckGo");
                Arc::new(DuckDuckGoSearch::new(self.config.tools.tool_timeout_secs))
            }
        }
    }

    fn storage(&self) -> Result<(Arc<dyn CheckpointStore>, Arc<dyn InterruptRegistry>), AgentError> {
        if let (Some(c), Some(i)) = (&self.checkpoints, &self.interrupts) {
            return Ok((c.clone(), i.clone()));
        }
        let (default_c, default_i): (Arc<dyn CheckpointStore>, Arc<dyn InterruptRegistry>) =
            match self.config.storage.backend {
                StorageBackend::Memory => (
                    Arc::new(MemoryCheckpointStore::new()),
                    Arc::new(MemoryInterruptRegistry::new()),
                ),
                StorageBackend::Sqlite => {
                    tracing::info!("opening SQLite store at {}", self.config.storage.path.display());
                    let store = Arc::new(SqliteStore::open(&self.config.storage.path)?);
                    (store.clone(), store)
                }
            };
        Ok((
            self.checkpoints.clone().unwrap_or(default_c),
            self.interrupts.clone().unwrap_or(default_i),
        ))
    }

    fn worker(
        &self,
        role: AgentRole,
        slot: ModelSlot,
        toolbox: Arc<dyn Toolbox>,
        prompt_name: &str,
        default_prompt: &str,
        max_iterations: usize,
    ) -> Result<Worker, AgentError> {
        let executor = ToolExecutor::new(role, toolbox, self.config.tools.tool_timeout_secs);
        Ok(Worker::new(
            role,
            self.llm(slot)?,
            executor,
            load_prompt(prompt_name, default_prompt),
            max_iterations,
        ))
    }

    pub fn build(self) -> Result<Workflow, AgentError> {
        let cfg = &self.config;
        let history_turns = cfg.app.history_turns;
        let (checkpoints, interrupts) = self.storage()?;

        let memory: Arc<dyn LongTermMemory> = match &self.memory {
            Some(m) => m.clone(),
            None if cfg.memory.enabled => Arc::new(InMemoryLongTerm::new(cfg.memory.max_entries)),
            None => Arc::new(NoopLongTerm),
        };
        let extractor = if cfg.memory.enabled && cfg.memory.extract_facts {
            Some(MemoryExtractor::new(
                self.llm(ModelSlot::MemoryExtractor)?,
                memory.clone(),
                load_prompt("memory_extractor", prompts::MEMORY_EXTRACTOR),
                history_turns,
            ))
        } else {
            None
        };

        let email: Arc<dyn EmailService> = self
            .email
            .clone()
            .unwrap_or_else(|| Arc::new(SandboxMailbox::new(DEFAULT_MAILBOX_OWNER)));
        let booking: Arc<dyn BookingService> = self
            .booking
            .clone()
            .unwrap_or_else(|| Arc::new(MockBookingService::new()));

        let mut workers = HashMap::new();
        workers.insert(
            AgentRole::EmailAgent,
            self.worker(
                AgentRole::EmailAgent,
                ModelSlot::EmailAgent,
                Arc::new(EmailToolbox::new(email)),
                "email_agent",
                prompts::EMAIL_AGENT,
                cfg.workflow.email_max_iterations,
            )?,
        );
        workers.insert(
            AgentRole::BookingAgent,
            self.worker(
                AgentRole::BookingAgent,
                ModelSlot::BookingAgent,
                Arc::new(BookingToolbox::new(booking)),
                "booking_agent",
                prompts::BOOKING_AGENT,
                cfg.workflow.booking_max_iterations,
            )?,
        );
        workers.insert(
            AgentRole::GeneralAgent,
            self.worker(
                AgentRole::GeneralAgent,
                ModelSlot::GeneralAgent,
                Arc::new(
                    GeneralToolbox::new(memory.clone(), cfg.memory.top_k)
                        .with_search(self.search_service(), cfg.tools.search_max_results),
                ),
                "general_agent",
                prompts::GENERAL_AGENT,
                cfg.workflow.general_max_iterations,
            )?,
        );

        Ok(Workflow {
            planner: Planner::new(
                self.llm(ModelSlot::Planner)?,
                load_prompt("planner", prompts::PLANNER),
                history_turns,
            ),
            analyzer: Analyzer::new(
                self.llm(ModelSlot::Analyzer)?,
                load_prompt("analyzer", prompts::ANALYZER),
            ),
            replanner: Replanner::new(
                self.llm(ModelSlot::Replanner)?,
                load_prompt("replanner", prompts::REPLANNER),
                history_turns,
            ),
            workers,
            checkpoints,
            interrupts,
            memory,
            extractor,
            events: EventSink::new(self.events.clone()),
            locks: ThreadLocks::new(),
            max_node_visits: cfg.workflow.max_node_visits.max(1),
            top_k: cfg.memory.top_k,
            inbox_concurrency: cfg.workflow.inbox_concurrency.max(1),
            usage: self.usage.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;

    fn memory_config() -> AppConfig {
        let mut cfg = AppConfig::default();
        cfg.storage.backend = StorageBackend::Memory;
        cfg
    }

    #[tokio::test]
    async fn test_build_with_mock_runs_conversational_reply() {
        let wf = WorkflowBuilder::new(memory_config())
            .with_default_llm(Arc::new(MockLlmClient))
            .build()
            .unwrap();
        let reply = wf.start("hello there", Some("t1")).await.unwrap();
        // Mock 回显纯文本，Planner 视为对话式回复
        assert!(reply.response.starts_with("Echo from Mock:"));
        assert!(reply.plan.is_empty());
        // 每个组件的客户端都记录请求次数
        let usage = wf.token_usage();
        assert_eq!(usage[0].0, ModelSlot::Planner);
        assert_eq!(usage[0].1.requests, 1);
        assert!(usage.iter().all(|(slot, _)| *slot != ModelSlot::Replanner));
    }

    #[test]
    fn test_sqlite_backend_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = AppConfig::default();
        cfg.storage.backend = StorageBackend::Sqlite;
        cfg.storage.path = dir.path().join("db").join("steward.db");
        cfg.memory.enabled = false;
        let wf = WorkflowBuilder::new(cfg.clone())
            .with_default_llm(Arc::new(MockLlmClient))
            .build();
        assert!(wf.is_ok());
        assert!(cfg.storage.path.exists());
    }
}
