//! 工具箱
//!
//! 每个 Worker 持有一个 Toolbox：`specs()` 给模型看的工具描述（参数 Schema 由 schemars 生成），
//! `invoke()` 把模型的工具调用解析成该 Worker 的命令枚举并显式分派。
//! 未知工具返回 `ToolError::Unknown`，由 Worker 记录告警后跳过。

use async_trait::async_trait;
use schemars::{schema_for, JsonSchema};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use crate::llm::ToolSpec;
use crate::memory::ToolCall;

/// 工具层错误（只在 Worker 内部转为观察文本）
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    Unknown(String),

    #[error("invalid arguments for {tool}: {reason}")]
    InvalidArguments { tool: String, reason: String },

    #[error("{0}")]
    Failed(String),

    #[error("tool {0} timed out")]
    Timeout(String),
}

#[async_trait]
pub trait Toolbox: Send + Sync {
    /// 可用工具描述
    fn specs(&self) -> Vec<ToolSpec>;

    /// 执行一次工具调用
    async fn invoke(&self, call: &ToolCall) -> Result<String, ToolError>;
}

/// 由参数类型生成工具描述
pub fn spec_for<T: JsonSchema>(name: &str, description: &str) -> ToolSpec {
    let schema = schema_for!(T);
    let mut parameters = serde_json::to_value(&schema).unwrap_or_else(|_| {
        serde_json::json!({"type": "object", "properties": {}})
    });
    if let Some(obj) = parameters.as_object_mut() {
        obj.remove("$schema");
        obj.remove("title");
    }
    ToolSpec {
        name: name.to_string(),
        description: description.to_string(),
        parameters,
    }
}

/// 把工具调用参数反序列化为具体类型；缺省参数（null）按空对象处理
pub fn parse_args<T: DeserializeOwned>(call: &ToolCall) -> Result<T, ToolError> {
    let args = match &call.arguments {
        Value::Null => Value::Object(Default::default()),
        other => other.clone(),
    };
    serde_json::from_value(args).map_err(|e| ToolError::InvalidArguments {
        tool: call.name.clone(),
        reason: e.to_string(),
    })
}

/// 无参数工具的参数类型
#[derive(Debug, Clone, Default, serde::Deserialize, JsonSchema)]
pub struct NoArgs {}
