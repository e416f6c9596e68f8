pub mod builder;
pub mod engine;
pub mod plan;
pub mod types;

pub use builder::WorkflowBuilder;
pub use engine::{ReplyKind, RunReply, Workflow};
pub use plan::{Plan, StepKey};
pub use types::*;
