//! 核心层：错误、运行状态与检查点、线程级串行化

pub mod error;
pub mod state;
pub mod thread_lock;

pub use error::AgentError;
pub use state::{now_millis, Checkpoint, RunOrigin, RunPhase, RunState, Suspension};
pub use thread_lock::ThreadLocks;
