//! 结构化输出解析
//!
//! 模型回复中的 JSON 可能被 ```json 代码块包裹，也可能夹在说明文字中间；
//! 这里统一提取第一个 JSON 对象并反序列化为目标类型。

use std::sync::OnceLock;

use regex::Regex;
use serde::de::DeserializeOwned;

use crate::core::AgentError;

static FENCED_JSON_RE: OnceLock<Option<Regex>> = OnceLock::new();

fn fenced_json_re() -> Option<&'static Regex> {
    FENCED_JSON_RE
        .get_or_init(|| Regex::new(r"(?s)```(?:json|JSON)?\s*(\{.*?\})\s*```").ok())
        .as_ref()
}

/// 提取回复中的 JSON 对象文本；没有任何 `{...}` 时返回 None
pub fn extract_json(output: &str) -> Option<&str> {
    let trimmed = output.trim();
    if let Some(caps) = fenced_json_re().and_then(|re| re.captures(trimmed)) {
        if let Some(m) = caps.get(1) {
            return Some(m.as_str());
        }
    }
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    (end > start).then(|| &trimmed[start..=end])
}

/// 提取并反序列化；无 JSON 或字段不匹配均为 JsonParseError
pub fn parse_structured<T: DeserializeOwned>(output: &str) -> Result<T, AgentError> {
    let json = extract_json(output)
        .ok_or_else(|| AgentError::JsonParseError(format!("no JSON object in: {}", preview(output))))?;
    serde_json::from_str(json)
        .map_err(|e| AgentError::JsonParseError(format!("{}: {}", e, preview(json))))
}

fn preview(s: &str) -> String {
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Sample {
        status: String,
    }

    #[test]
    fn test_fenced_block() {
        let out = "Here is my decision:\n```json\n{\"status\": \"FINISHED\"}\n```\nThanks.";
        let p: Sample = parse_structured(out).unwrap();
        assert_eq!(p.status, "FINISHED");
    }

    #[test]
    fn test_inline_object() {
        let out = "Sure. {\"status\": \"CONTINUE\"}";
        assert_eq!(extract_json(out), Some("{\"status\": \"CONTINUE\"}"));
    }

    #[test]
    fn test_no_json() {
        assert_eq!(extract_json("just words"), None);
        let err = parse_structured::<Sample>("just words").unwrap_err();
        assert!(matches!(err, AgentError::JsonParseError(_)));
    }

    #[test]
    fn test_malformed_json() {
        let err = parse_structured::<Sample>("{\"status\": }").unwrap_err();
        assert!(matches!(err, AgentError::JsonParseError(_)));
    }
}
