//! OpenAI 兼容 API 客户端
//!
//! 直接用 reqwest 调用 `/chat/completions`，透传 tools / tool_calls；
//! 可配置 base_url，支持 DeepSeek、OpenAI、自建代理等。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::llm::{Generation, LlmClient, LlmError, ToolSpec, Usage};
use crate::memory::{Message, Role, ToolCall};

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<WireTool>>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct WireMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct WireTool {
    #[serde(rename = "type")]
    tool_type: &'static str,
    function: WireFunction,
}

#[derive(Debug, Serialize)]
struct WireFunction {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type", default = "function_type")]
    call_type: String,
    function: WireFunctionCall,
}

fn function_type() -> String {
    "function".to_string()
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct WireFunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// OpenAI 兼容客户端
pub struct OpenAiClient {
    http: Client,
    endpoint: String,
    model: String,
    temperature: Option<f32>,
}

impl OpenAiClient {
    pub fn new(
        base_url: Option<&str>,
        model: &str,
        api_key: Option<&str>,
        timeout_secs: u64,
    ) -> Result<Self, LlmError> {
        let api_key = api_key
            .map(String::from)
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .unwrap_or_default();

        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );
        if !api_key.is_empty() {
            let auth = header::HeaderValue::from_str(&format!("Bearer {}", api_key))
                .map_err(|e| LlmError::Request(format!("invalid API key format: {}", e)))?;
            headers.insert(header::AUTHORIZATION, auth);
        }

        let http = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| LlmError::Request(format!("failed to create HTTP client: {}", e)))?;

        let base = base_url.unwrap_or(OPENAI_BASE_URL).trim_end_matches('/');
        Ok(Self {
            http,
            endpoint: format!("{}/chat/completions", base),
            model: model.to_string(),
            temperature: None,
        })
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

fn to_wire(m: &Message) -> WireMessage {
    let role = match m.role {
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::System => "system",
        Role::Tool => "tool",
    };
    let tool_calls = if m.tool_calls.is_empty() {
        None
    } else {
        Some(
            m.tool_calls
                .iter()
                .map(|c| WireToolCall {
                    id: c.id.clone(),
                    call_type: function_type(),
                    function: WireFunctionCall {
                        name: c.name.clone(),
                        arguments: c.arguments.to_string(),
                    },
                })
                .collect(),
        )
    };
    // assistant 发起工具调用时 content 可为空
    let content = if m.content.is_empty() && tool_calls.is_some() {
        None
    } else {
        Some(m.content.clone())
    };
    WireMessage {
        role: role.to_string(),
        content,
        tool_calls,
        tool_call_id: m.tool_call_id.clone(),
    }
}

fn from_wire_call(c: WireToolCall) -> ToolCall {
    let arguments = if c.function.arguments.trim().is_empty() {
        Value::Object(Default::default())
    } else {
        serde_json::from_str(&c.function.arguments)
            .unwrap_or(Value::String(c.function.arguments))
    };
    ToolCall::new(c.id, c.function.name, arguments)
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn generate(&self, messages: &[Message], tools: &[ToolSpec]) -> Result<Generation, LlmError> {
        let wire_tools = if tools.is_empty() {
            None
        } else {
            Some(
                tools
                    .iter()
                    .map(|t| WireTool {
                        tool_type: "function",
                        function: WireFunction {
                            name: t.name.clone(),
                            description: t.description.clone(),
                            parameters: t.parameters.clone(),
                        },
                    })
                    .collect(),
            )
        };
        let request = CompletionRequest {
            model: &self.model,
            messages: messages.iter().map(to_wire).collect(),
            temperature: self.temperature,
            tools: wire_tools,
        };

        let response = self
            .http
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::Request(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| LlmError::Request(e.to_string()))?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: CompletionResponse = serde_json::from_str(&body)
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
        let usage = parsed
            .usage
            .map(|u| Usage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
            })
            .unwrap_or_default();

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse("no choices in response".to_string()))?;

        Ok(Generation {
            text: choice.message.content.unwrap_or_default(),
            tool_calls: choice
                .message
                .tool_calls
                .unwrap_or_default()
                .into_iter()
                .map(from_wire_call)
                .collect(),
            usage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_wire_assistant_tool_call() {
        let msg = Message::assistant_with_tools(
            "",
            vec![ToolCall::new("call_1", "email_draft", serde_json::json!({"recipient": "a@b.c"}))],
        );
        let wire = to_wire(&msg);
        assert_eq!(wire.role, "assistant");
        assert!(wire.content.is_none());
        let calls = wire.tool_calls.unwrap();
        assert_eq!(calls[0].function.name, "email_draft");
        assert_eq!(calls[0].function.arguments, r#"{"recipient":"a@b.c"}"#);
    }

    #[test]
    fn test_from_wire_call_tolerates_bad_arguments() {
        let call = from_wire_call(WireToolCall {
            id: "c".into(),
            call_type: "function".into(),
            function: WireFunctionCall {
                name: "search_hotels".into(),
                arguments: "not json".into(),
            },
        });
        assert_eq!(call.arguments, Value::String("not json".into()));

        let empty = from_wire_call(WireToolCall {
            id: "c".into(),
            call_type: "function".into(),
            function: WireFunctionCall {
                name: "calendar_get_items".into(),
                arguments: "".into(),
            },
        });
        assert!(empty.arguments.is_object());
    }

    #[test]
    fn test_endpoint_from_base_url() {
        let client = OpenAiClient::new(Some("https://api.deepseek.com/"), "deepseek-chat", Some("k"), 5).unwrap();
        assert_eq!(client.endpoint, "https://api.deepseek.com/chat/completions");
        assert_eq!(client.model(), "deepseek-chat");
    }
}
