//! 记忆层：对话消息、长期事实记忆、运行结束后的事实抽取

pub mod conversation;
pub mod extractor;
pub mod long_term;

pub use conversation::{format_history, Message, Role, ToolCall};
pub use extractor::MemoryExtractor;
pub use long_term::{FactCategory, InMemoryLongTerm, LongTermMemory, MemoryError, MemoryFact, NoopLongTerm};
