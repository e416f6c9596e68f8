//! 对话消息
//!
//! `Message` 同时用于线程级对话日志（user / assistant）与 Worker 内部的工具调用转录
//! （assistant 携带 tool_calls，tool 消息携带 tool_call_id）。

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 消息角色（与 LLM API 一致）
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
    Tool,
}

/// 模型请求的一次工具调用
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// 单条消息
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    fn plain(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(Role::System, content)
    }

    /// 携带工具调用请求的 assistant 消息
    pub fn assistant_with_tools(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls,
            ..Self::plain(Role::Assistant, content)
        }
    }

    /// 工具执行结果
    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            ..Self::plain(Role::Tool, content)
        }
    }
}

/// 将最近 `max_turns` 轮 user/assistant 对话格式化为 `User:` / `Assistant:` 文本
pub fn format_history(messages: &[Message], max_turns: usize) -> String {
    let turns: Vec<&Message> = messages
        .iter()
        .filter(|m| matches!(m.role, Role::User | Role::Assistant))
        .collect();
    let keep = max_turns.saturating_mul(2);
    let start = turns.len().saturating_sub(keep);
    let lines: Vec<String> = turns[start..]
        .iter()
        .map(|m| match m.role {
            Role::User => format!("User: {}", m.content),
            _ => format!("Assistant: {}", m.content),
        })
        .collect();
    if lines.is_empty() {
        "(No prior conversation)".to_string()
    } else {
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_history_empty() {
        assert_eq!(format_history(&[], 10), "(No prior conversation)");
    }

    #[test]
    fn test_format_history_keeps_recent_turns() {
        let mut msgs = Vec::new();
        for i in 0..5 {
            msgs.push(Message::user(format!("q{}", i)));
            msgs.push(Message::assistant(format!("a{}", i)));
        }
        msgs.push(Message::tool("call_1", "ignored"));
        let text = format_history(&msgs, 2);
        assert_eq!(text, "User: q3\nAssistant: a3\nUser: q4\nAssistant: a4");
    }

    #[test]
    fn test_tool_message_serde_skips_empty_fields() {
        let v = serde_json::to_value(Message::user("hi")).unwrap();
        assert!(v.get("tool_calls").is_none());
        assert!(v.get("tool_call_id").is_none());
        let t = serde_json::to_value(Message::tool("c1", "ok")).unwrap();
        assert_eq!(t["role"], "tool");
        assert_eq!(t["tool_call_id"], "c1");
    }
}
