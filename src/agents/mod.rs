//! 多 Agent 编排：Planner / Analyzer 出计划，Supervisor 路由，Worker 执行，Replanner 评估

pub mod analyzer;
pub mod emotion;
pub mod events;
pub mod planner;
pub mod prompts;
pub mod replanner;
pub mod structured;
pub mod supervisor;
pub mod worker;

pub use analyzer::{Analyzer, InboundEmail};
pub use emotion::UserEmotion;
pub use events::{EventSink, RunEvent, ThreadEvent};
pub use planner::{PlanOutcome, Planner, PlannerResult};
pub use replanner::{ReplanDecision, ReplanOutcome, Replanner, StepVerdict};
pub use supervisor::{next_node, route, Route};
pub use worker::{Worker, WorkerOutcome, WorkerPause, NEED_INPUT_MARKER};
