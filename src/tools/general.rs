//! 通用工具：网页搜索、长期记忆检索、日历（事件 / 待办 / 提醒）、当前时间

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::llm::ToolSpec;
use crate::memory::{FactCategory, LongTermMemory, ToolCall};
use crate::tools::search::{format_results, SandboxSearch, SearchService, WebSearchArgs, MAX_SEARCH_RESULTS};
use crate::tools::toolbox::{parse_args, spec_for, NoArgs};
use crate::tools::{ToolError, Toolbox};

#[derive(Debug, Clone, PartialEq, Deserialize, JsonSchema)]
pub struct MemorySearchArgs {
    /// What to look for in the user's long-term memory
    pub query: String,
    /// Optional category: user_profile, preference, key_detail or learned_fact
    #[serde(default)]
    #[schemars(with = "Option<String>")]
    pub category: Option<FactCategory>,
    #[serde(default)]
    pub top_k: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    Event,
    Todo,
    Reminder,
}

impl ItemType {
    fn label(&self) -> &'static str {
        match self {
            ItemType::Event => "EVENT",
            ItemType::Todo => "TODO",
            ItemType::Reminder => "REMINDER",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, JsonSchema)]
pub struct CalendarAddArgs {
    pub title: String,
    pub item_type: ItemType,
    /// ISO 8601 datetime, e.g. 2025-05-01T10:00:00
    pub start_time: String,
    #[serde(default)]
    pub end_time: Option<String>,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, JsonSchema)]
pub struct CalendarRangeArgs {
    /// ISO 8601 start of the range (inclusive)
    pub start_time: String,
    /// ISO 8601 end of the range (inclusive)
    pub end_time: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, JsonSchema)]
pub struct CalendarItemIdArgs {
    pub item_id: String,
}

/// 通用 Worker 的命令
#[derive(Debug, Clone, PartialEq)]
pub enum GeneralCommand {
    WebSearch(WebSearchArgs),
    MemorySearch(MemorySearchArgs),
    CalendarAdd(CalendarAddArgs),
    CalendarGet(CalendarRangeArgs),
    CalendarDelete(CalendarItemIdArgs),
    CalendarToggleTodo(CalendarItemIdArgs),
    CurrentTime,
}

impl GeneralCommand {
    pub fn parse(call: &ToolCall) -> Result<Self, ToolError> {
        match call.name.as_str() {
            "web_search" => Ok(Self::WebSearch(parse_args(call)?)),
            "memory_search" => Ok(Self::MemorySearch(parse_args(call)?)),
            "calendar_add_item" => Ok(Self::CalendarAdd(parse_args(call)?)),
            "calendar_get_items" => Ok(Self::CalendarGet(parse_args(call)?)),
            "calendar_delete_item" => Ok(Self::CalendarDelete(parse_args(call)?)),
            "calendar_toggle_todo" => Ok(Self::CalendarToggleTodo(parse_args(call)?)),
            "current_time" => {
                let _: NoArgs = parse_args(call)?;
                Ok(Self::CurrentTime)
            }
            other => Err(ToolError::Unknown(other.to_string())),
        }
    }

    pub fn specs() -> Vec<ToolSpec> {
        vec![
            spec_for::<WebSearchArgs>("web_search", "Search the web for current information."),
            spec_for::<MemorySearchArgs>("memory_search", "Search facts remembered about the user."),
            spec_for::<CalendarAddArgs>("calendar_add_item", "Add an event, todo or reminder to the calendar."),
            spec_for::<CalendarRangeArgs>("calendar_get_items", "List calendar items between two datetimes."),
            spec_for::<CalendarItemIdArgs>("calendar_delete_item", "Delete a calendar item by id."),
            spec_for::<CalendarItemIdArgs>("calendar_toggle_todo", "Toggle completion of a todo item."),
            spec_for::<NoArgs>("current_time", "Get the current local date and time."),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarItem {
    pub id: String,
    pub title: String,
    pub item_type: ItemType,
    pub start_time: NaiveDateTime,
    pub end_time: Option<NaiveDateTime>,
    pub description: String,
    pub done: bool,
}

fn parse_time(field: &str, s: &str) -> Result<NaiveDateTime, String> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M"))
        .or_else(|_| {
            chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .map(|d| d.and_time(chrono::NaiveTime::MIN))
        })
        .map_err(|_| format!("{} '{}' is not ISO 8601 (YYYY-MM-DDTHH:MM:SS)", field, s))
}

/// 通用 Worker 的工具箱
pub struct GeneralToolbox {
    memory: Arc<dyn LongTermMemory>,
    default_top_k: usize,
    search: Arc<dyn SearchService>,
    default_results: usize,
    calendar: RwLock<Vec<CalendarItem>>,
    next_id: RwLock<u64>,
}

impl GeneralToolbox {
    pub fn new(memory: Arc<dyn LongTermMemory>, default_top_k: usize) -> Self {
        Self {
            memory,
            default_top_k,
            search: Arc::new(SandboxSearch::new()),
            default_results: 5,
            calendar: RwLock::new(Vec::new()),
            next_id: RwLock::new(1),
        }
    }

    /// 替换搜索后端（默认离线）
    pub fn with_search(mut self, search: Arc<dyn SearchService>, default_results: usize) -> Self {
        self.search = search;
        self.default_results = default_results;
        self
    }

    pub async fn calendar_items(&self) -> Vec<CalendarItem> {
        self.calendar.read().await.clone()
    }

    async fn web_search(&self, args: WebSearchArgs) -> Result<String, String> {
        let limit = args
            .max_results
            .unwrap_or(self.default_results)
            .clamp(1, MAX_SEARCH_RESULTS);
        let hits = self.search.search(&args.query, limit).await?;
        Ok(format_results(&args.query, &hits))
    }

    async fn memory_search(&self, args: MemorySearchArgs) -> Result<String, String> {
        let top_k = args.top_k.unwrap_or(self.default_top_k);
        let facts = self
            .memory
            .retrieve(&args.query, top_k, args.category)
            .await
            .map_err(|e| e.to_string())?;
        if facts.is_empty() {
            Ok(format!("No remembered facts about '{}'.", args.query))
        } else {
            Ok(facts
                .iter()
                .map(|f| format!("- {}", f))
                .collect::<Vec<_>>()
                .join("\n"))
        }
    }

    async fn calendar_add(&self, args: CalendarAddArgs) -> Result<String, String> {
        let start_time = parse_time("start_time", &args.start_time)?;
        let end_time = args
            .end_time
            .as_deref()
            .map(|s| parse_time("end_time", s))
            .transpose()?;
        if matches!(end_time, Some(end) if end < start_time) {
            return Err("end_time is before start_time".to_string());
        }
        let id = {
            let mut next = self.next_id.write().await;
            let id = format!("cal-{}", *next);
            *next += 1;
            id
        };
        self.calendar.write().await.push(CalendarItem {
            id: id.clone(),
            title: args.title,
            item_type: args.item_type,
            start_time,
            end_time,
            description: args.description,
            done: false,
        });
        Ok(format!("Calendar item added successfully. ID: {}", id))
    }

    async fn calendar_get(&self, args: CalendarRangeArgs) -> Result<String, String> {
        let start = parse_time("start_time", &args.start_time)?;
        let end = parse_time("end_time", &args.end_time)?;
        let items = self.calendar.read().await;
        let mut hits: Vec<&CalendarItem> = items
            .iter()
            .filter(|i| i.start_time >= start && i.start_time <= end)
            .collect();
        hits.sort_by_key(|i| i.start_time);
        if hits.is_empty() {
            return Ok("No items found in this range.".to_string());
        }
        Ok(hits
            .iter()
            .map(|i| {
                let mark = if i.done { " (done)" } else { "" };
                format!(
                    "- [{}] {} {} ({}){}",
                    i.item_type.label(),
                    i.id,
                    i.title,
                    i.start_time,
                    mark
                )
            })
            .collect::<Vec<_>>()
            .join("\n"))
    }

    async fn calendar_delete(&self, item_id: &str) -> Result<String, String> {
        let mut items = self.calendar.write().await;
        let before = items.len();
        items.retain(|i| i.id != item_id);
        if items.len() < before {
            Ok(format!("Item {} deleted.", item_id))
        } else {
            Err(format!("item {} does not exist", item_id))
        }
    }

    async fn calendar_toggle(&self, item_id: &str) -> Result<String, String> {
        let mut items = self.calendar.write().await;
        match items
            .iter_mut()
            .find(|i| i.id == item_id && i.item_type == ItemType::Todo)
        {
            Some(item) => {
                item.done = !item.done;
                Ok(format!(
                    "Todo {} marked {}.",
                    item_id,
                    if item.done { "done" } else { "not done" }
                ))
            }
            None => Err(format!("todo {} does not exist", item_id)),
        }
    }
}

#[async_trait]
impl Toolbox for GeneralToolbox {
    fn specs(&self) -> Vec<ToolSpec> {
        GeneralCommand::specs()
    }

    async fn invoke(&self, call: &ToolCall) -> Result<String, ToolError> {
        let result = match GeneralCommand::parse(call)? {
            GeneralCommand::WebSearch(a) => self.web_search(a).await,
            GeneralCommand::MemorySearch(a) => self.memory_search(a).await,
            GeneralCommand::CalendarAdd(a) => self.calendar_add(a).await,
            GeneralCommand::CalendarGet(a) => self.calendar_get(a).await,
            GeneralCommand::CalendarDelete(a) => self.calendar_delete(&a.item_id).await,
            GeneralCommand::CalendarToggleTodo(a) => self.calendar_toggle(&a.item_id).await,
            GeneralCommand::CurrentTime => Ok(chrono::Local::now()
                .format("%Y-%m-%d %H:%M:%S %Z")
                .to_string()),
        };
        result.map_err(ToolError::Failed)
    }
}
