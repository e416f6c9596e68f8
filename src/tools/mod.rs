//! 工具层：各 Worker 的工具箱（邮件 / 预订 / 通用 + 网页搜索）与带超时、审计日志的执行器

pub mod booking;
pub mod email;
pub mod executor;
pub mod general;
pub mod search;
pub mod toolbox;

pub use booking::{BookingCommand, BookingService, BookingToolbox, MockBookingService};
pub use email::{EmailCommand, EmailService, EmailToolbox, SandboxMailbox};
pub use executor::ToolExecutor;
pub use general::{GeneralCommand, GeneralToolbox};
pub use search::{DuckDuckGoSearch, SandboxSearch, SearchHit, SearchService};
pub use toolbox::{ToolError, Toolbox};
