//! 长期记忆：跨线程保存的用户事实（画像、偏好、关键细节、习得事实）
//!
//! 支持 retrieve(query, top_k, category) 与 store(facts)；当前实现为 InMemoryLongTerm
//! （关键词重叠打分），后续可接真实向量库。调用方把所有错误视为可忽略（记录日志后继续）。

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 事实类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactCategory {
    UserProfile,
    Preference,
    KeyDetail,
    LearnedFact,
}

/// 一条长期事实
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryFact {
    pub text: String,
    pub category: FactCategory,
}

impl MemoryFact {
    pub fn new(text: impl Into<String>, category: FactCategory) -> Self {
        Self {
            text: text.into(),
            category,
        }
    }
}

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("memory backend error: {0}")]
    Backend(String),
}

/// 长期记忆 trait
#[async_trait]
pub trait LongTermMemory: Send + Sync {
    /// 按查询检索最相关的 top_k 条事实文本，可按类别过滤
    async fn retrieve(
        &self,
        query: &str,
        top_k: usize,
        category: Option<FactCategory>,
    ) -> Result<Vec<String>, MemoryError>;

    /// 写入事实，返回实际写入条数
    async fn store(&self, facts: &[MemoryFact]) -> Result<usize, MemoryError>;

    /// 是否启用（Noop 实现返回 false）
    fn enabled(&self) -> bool {
        true
    }
}

/// 空实现：未启用长期记忆时使用
#[derive(Clone, Default)]
pub struct NoopLongTerm;

#[async_trait]
impl LongTermMemory for NoopLongTerm {
    async fn retrieve(
        &self,
        _query: &str,
        _top_k: usize,
        _category: Option<FactCategory>,
    ) -> Result<Vec<String>, MemoryError> {
        Ok(Vec::new())
    }

    async fn store(&self, _facts: &[MemoryFact]) -> Result<usize, MemoryError> {
        Ok(0)
    }

    fn enabled(&self) -> bool {
        false
    }
}

struct Entry {
    fact: MemoryFact,
    tokens: HashSet<String>,
}

/// 简单内存实现：按关键词重叠检索，超过 max_entries 时淘汰最旧的
#[derive(Clone)]
pub struct InMemoryLongTerm {
    entries: Arc<RwLock<Vec<Entry>>>,
    max_entries: usize,
}

/// 将文本切分为小写词集合（去掉标点）
fn tokenize_lower(s: &str) -> HashSet<String> {
    s.split(|c: char| !c.is_alphanumeric() && c != '@' && c != '.')
        .map(|w| w.trim_matches('.').to_lowercase())
        .filter(|w| w.len() > 1)
        .collect()
}

impl InMemoryLongTerm {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: Arc::new(RwLock::new(Vec::new())),
            max_entries,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl LongTermMemory for InMemoryLongTerm {
    async fn retrieve(
        &self,
        query: &str,
        top_k: usize,
        category: Option<FactCategory>,
    ) -> Result<Vec<String>, MemoryError> {
        let query_tokens = tokenize_lower(query);
        if query_tokens.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }
        let entries = self
            .entries
            .read()
            .map_err(|_| MemoryError::Backend("memory lock poisoned".to_string()))?;
        let mut scored: Vec<(usize, usize)> = entries
            .iter()
            .enumerate()
            .filter(|(_, e)| category.map_or(true, |c| e.fact.category == c))
            .map(|(idx, e)| (idx, query_tokens.intersection(&e.tokens).count()))
            .filter(|(_, score)| *score > 0)
            .collect();
        // 分数相同时新事实优先
        scored.sort_by(|a, b| b.1.cmp(&a.1).then(b.0.cmp(&a.0)));
        Ok(scored
            .into_iter()
            .take(top_k)
            .map(|(idx, _)| entries[idx].fact.text.clone())
            .collect())
    }

    async fn store(&self, facts: &[MemoryFact]) -> Result<usize, MemoryError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| MemoryError::Backend("memory lock poisoned".to_string()))?;
        let mut added = 0;
        for fact in facts {
            let text = fact.text.trim();
            if text.is_empty() || entries.iter().any(|e| e.fact.text == text) {
                continue;
            }
            entries.push(Entry {
                fact: MemoryFact::new(text, fact.category),
                tokens: tokenize_lower(text),
            });
            added += 1;
        }
        let n = entries.len();
        if n > self.max_entries {
            entries.drain(0..n - self.max_entries);
        }
        Ok(added)
    }
}
