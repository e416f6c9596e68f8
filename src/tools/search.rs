//! 网页搜索：`SearchService` 抽象，离线固定结果与 DuckDuckGo 两种后端
//!
//! DuckDuckGo 后端请求 HTML 版结果页，用正则切出标题 / 链接 / 摘要，
//! 再用 html2text 去掉标签与实体；结果以 JSON 文本交给模型。

use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

const DUCKDUCKGO_HTML_URL: &str = "https://html.duckduckgo.com/html/";
const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";
/// 单次最多返回条数
pub const MAX_SEARCH_RESULTS: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, JsonSchema)]
pub struct WebSearchArgs {
    /// The search query
    pub query: String,
    /// Maximum number of results (default 5, at most 10)
    #[serde(default)]
    pub max_results: Option<usize>,
}

/// 一条搜索结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

#[async_trait]
pub trait SearchService: Send + Sync {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>, String>;
}

/// 交给模型的结果文本：`{status, query, count, results}`
pub fn format_results(query: &str, hits: &[SearchHit]) -> String {
    let body = if hits.is_empty() {
        serde_json::json!({"status": "no_results", "query": query, "results": []})
    } else {
        serde_json::json!({
            "status": "success",
            "query": query,
            "count": hits.len(),
            "results": hits,
        })
    };
    serde_json::to_string_pretty(&body).unwrap_or_else(|_| body.to_string())
}

const SANDBOX_PAGES: [(&str, &str, &str); 5] = [
    (
        "Lisbon weather forecast",
        "https://weather.example.com/lisbon",
        "Lisbon, Portugal: sunny, highs of 24°C this week with light winds from the north.",
    ),
    (
        "Porto travel guide: where to stay",
        "https://travel.example.com/porto",
        "Ribeira and Baixa are the most popular areas to stay in Porto, close to the river and the old town.",
    ),
    (
        "Almada, across the river from Lisbon",
        "https://travel.example.com/almada",
        "Almada is a short ferry ride from Lisbon and has cheaper hotels with views of the city.",
    ),
    (
        "How to write a quarterly report",
        "https://work.example.com/q3-report",
        "A good Q3 report opens with a summary, then covers revenue, costs and the outlook for Q4.",
    ),
    (
        "Public holidays in Portugal",
        "https://calendar.example.com/portugal",
        "Portugal observes 13 national public holidays, including 25 April and 10 June.",
    ),
];

/// 离线搜索：按关键词重合度返回固定页面
#[derive(Debug, Default)]
pub struct SandboxSearch;

impl SandboxSearch {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SearchService for SandboxSearch {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>, String> {
        let words: Vec<String> = query
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.chars().count() > 2)
            .map(str::to_lowercase)
            .collect();
        if words.is_empty() {
            return Err("query is empty".to_string());
        }
        let mut scored: Vec<(usize, SearchHit)> = SANDBOX_PAGES
            .iter()
            .filter_map(|(title, url, snippet)| {
                let haystack = format!("{} {}", title, snippet).to_lowercase();
                let score = words.iter().filter(|w| haystack.contains(w.as_str())).count();
                (score > 0).then(|| {
                    (
                        score,
                        SearchHit {
                            title: title.to_string(),
                            url: url.to_string(),
                            snippet: snippet.to_string(),
                        },
                    )
                })
            })
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(scored.into_iter().take(max_results).map(|(_, hit)| hit).collect())
    }
}

/// DuckDuckGo HTML 搜索
pub struct DuckDuckGoSearch {
    client: Client,
}

impl DuckDuckGoSearch {
    pub fn new(timeout_secs: u64) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_default();
        Self { client }
    }
}

#[async_trait]
impl SearchService for DuckDuckGoSearch {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>, String> {
        if query.trim().is_empty() {
            return Err("query is empty".to_string());
        }
        tracing::info!(query = %query, "web search");
        let resp = self
            .client
            .get(DUCKDUCKGO_HTML_URL)
            .query(&[("q", query)])
            .send()
            .await
            .map_err(|e| format!("Request failed: {}", e))?;
        if !resp.status().is_success() {
            return Err(format!("HTTP {}", resp.status()));
        }
        let body = resp.text().await.map_err(|e| format!("Read body: {}", e))?;
        Ok(parse_results(&body, max_results))
    }
}

static TITLE_RE: OnceLock<Option<Regex>> = OnceLock::new();
static SNIPPET_RE: OnceLock<Option<Regex>> = OnceLock::new();
static TAG_RE: OnceLock<Option<Regex>> = OnceLock::new();

fn cached(cell: &'static OnceLock<Option<Regex>>, pattern: &str) -> Option<&'static Regex> {
    cell.get_or_init(|| Regex::new(pattern).ok()).as_ref()
}

/// 从结果页 HTML 中切出结果；标题与摘要按出现顺序配对
pub fn parse_results(html: &str, max_results: usize) -> Vec<SearchHit> {
    let (Some(title_re), Some(snippet_re)) = (
        cached(&TITLE_RE, r#"(?s)<a[^>]*class="result__a"[^>]*href="([^"]+)"[^>]*>(.*?)</a>"#),
        cached(&SNIPPET_RE, r#"(?s)<a[^>]*class="result__snippet"[^>]*>(.*?)</a>"#),
    ) else {
        return Vec::new();
    };
    let snippets: Vec<String> = snippet_re
        .captures_iter(html)
        .map(|c| fragment_text(c.get(1).map_or("", |m| m.as_str())))
        .collect();
    title_re
        .captures_iter(html)
        .enumerate()
        .map(|(i, c)| SearchHit {
            title: fragment_text(c.get(2).map_or("", |m| m.as_str())),
            url: resolve_link(c.get(1).map_or("", |m| m.as_str())),
            snippet: snippets.get(i).cloned().unwrap_or_default(),
        })
        .filter(|hit| !hit.title.is_empty())
        .take(max_results)
        .collect()
}

/// DuckDuckGo 的跳转链接 `//duckduckgo.com/l/?uddg=<目标>` 还原为目标地址
fn resolve_link(href: &str) -> String {
    let href = href.replace("&amp;", "&");
    let absolute = if href.starts_with("//") {
        format!("https:{}", href)
    } else {
        href
    };
    reqwest::Url::parse(&absolute)
        .ok()
        .and_then(|u| {
            u.query_pairs()
                .find(|(k, _)| k == "uddg")
                .map(|(_, v)| v.into_owned())
        })
        .unwrap_or(absolute)
}

fn fragment_text(html: &str) -> String {
    let text = match html2text::from_read(html.as_bytes(), 200) {
        Ok(text) if !text.trim().is_empty() => text,
        _ => cached(&TAG_RE, r"<[^>]+>")
            .map(|re| re.replace_all(html, " ").into_owned())
            .unwrap_or_else(|| html.to_string()),
    };
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const RESULT_PAGE: &str = r#"
<div class="result results_links">
  <h2 class="result__title">
    <a rel="nofollow" class="result__a" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fwww.visitlisboa.com%2Fen&amp;rut=abc">Visit Lisboa &amp; more</a>
  </h2>
  <a class="result__snippet" href="//duckduckgo.com/l/?uddg=x">The official tourism site for Lisbon.</a>
</div>
<div class="result results_links">
  <h2 class="result__title">
    <a rel="nofollow" class="result__a" href="https://en.wikipedia.org/wiki/Lisbon">Lisbon - Wikipedia</a>
  </h2>
  <a class="result__snippet" href="https://en.wikipedia.org/wiki/Lisbon">Lisbon is the capital of Portugal.</a>
</div>
"#;

    #[test]
    fn test_parse_result_page() {
        let hits = parse_results(RESULT_PAGE, 5);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].url, "https://www.visitlisboa.com/en");
        assert!(hits[0].title.contains("Visit Lisboa & more"));
        assert_eq!(hits[0].snippet, "The official tourism site for Lisbon.");
        assert_eq!(hits[1].url, "https://en.wikipedia.org/wiki/Lisbon");
        assert_eq!(parse_results(RESULT_PAGE, 1).len(), 1);
        assert!(parse_results("<html>nothing here</html>", 5).is_empty());
    }

    #[tokio::test]
    async fn test_sandbox_ranks_by_overlap() {
        let hits = SandboxSearch::new().search("hotels near Lisbon", 5).await.unwrap();
        assert_eq!(hits[0].url, "https://travel.example.com/almada");
        assert!(hits.len() >= 2);
        assert!(SandboxSearch::new().search("zzz qqq", 5).await.unwrap().is_empty());
        assert!(SandboxSearch::new().search("  ", 5).await.is_err());
    }

    #[test]
    fn test_format_results_shape() {
        let none: serde_json::Value = serde_json::from_str(&format_results("x", &[])).unwrap();
        assert_eq!(none["status"], "no_results");
        let hit = SearchHit {
            title: "t".to_string(),
            url: "u".to_string(),
            snippet: "s".to_string(),
        };
        let some: serde_json::Value = serde_json::from_str(&format_results("x", &[hit])).unwrap();
        assert_eq!(some["status"], "success");
        assert_eq!(some["count"], 1);
        assert_eq!(some["results"][0]["url"], "u");
    }
}
