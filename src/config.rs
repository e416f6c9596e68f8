//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `STEWARD__*` 覆盖（双下划线表示嵌套，如
//! `STEWARD__LLM__PROVIDER=openai`、`STEWARD__LLM__AGENTS__REPLANNER=gpt-4o`）。

use std::collections::HashMap;
use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub workflow: WorkflowSection,
    pub tools: ToolsSection,
    pub storage: StorageSection,
    pub memory: MemorySection,
}

/// [app] 段：应用名、提示词中携带的历史轮数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: Option<String>,
    /// Planner / Replanner 提示词中保留的最近对话轮数
    pub history_turns: usize,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: None,
            history_turns: 10,
        }
    }
}

/// [llm] 段：后端选择、默认模型与按 Agent 的模型覆盖表
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// 后端：deepseek / openai / mock；没有 API Key 时回退到 mock
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    pub temperature: Option<f32>,
    /// 单次请求超时（秒）
    pub timeout_secs: u64,
    /// 按 Agent 覆盖模型：键为 planner / analyzer / email_agent / booking_agent /
    /// general_agent / replanner / memory_extractor
    pub agents: HashMap<String, String>,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "deepseek".to_string(),
            model: "deepseek-chat".to_string(),
            base_url: None,
            temperature: None,
            timeout_secs: 60,
            agents: HashMap::new(),
        }
    }
}

/// [workflow] 段：节点访问上限与各 Worker 的工具迭代上限
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkflowSection {
    /// 单次运行最多经过的节点数，超过即判定为循环并以 FAILED 结束
    pub max_node_visits: usize,
    pub email_max_iterations: usize,
    pub booking_max_iterations: usize,
    pub general_max_iterations: usize,
    /// 收件箱批处理的并发线程数
    pub inbox_concurrency: usize,
}

impl Default for WorkflowSection {
    fn default() -> Self {
        Self {
            max_node_visits: 60,
            email_max_iterations: 10,
            booking_max_iterations: 5,
            general_max_iterations: 5,
            inbox_concurrency: 4,
        }
    }
}

/// [tools] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    /// 单次工具调用超时（秒）
    pub tool_timeout_secs: u64,
    /// web_search 后端
    pub search_backend: SearchBackend,
    /// web_search 默认返回条数
    pub search_max_results: usize,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: 30,
            search_backend: SearchBackend::Sandbox,
            search_max_results: 5,
        }
    }
}

/// web_search 后端：离线固定结果或 DuckDuckGo
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchBackend {
    Sandbox,
    DuckDuckGo,
}

/// 检查点与中断队列的存储后端
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    Sqlite,
}

/// [storage] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    pub backend: StorageBackend,
    /// SQLite 文件路径
    pub path: PathBuf,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Sqlite,
            path: PathBuf::from("data/steward.db"),
        }
    }
}

/// [memory] 段：长期记忆
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MemorySection {
    pub enabled: bool,
    /// 规划前检索的事实条数
    pub top_k: usize,
    pub max_entries: usize,
    /// 运行结束后是否从对话中抽取事实写入长期记忆
    pub extract_facts: bool,
}

impl Default for MemorySection {
    fn default() -> Self {
        Self {
            enabled: true,
            top_k: 3,
            max_entries: 1000,
            extract_facts: true,
        }
    }
}

/// 从 config 目录加载配置，环境变量 STEWARD__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 STEWARD__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("STEWARD")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
