//! 邮件工具：email_draft / email_send / email_read / email_search
//!
//! 工具调用先解析为 `EmailCommand`，再分派到 `EmailService`。
//! 内置 `SandboxMailbox` 只在内存中记录草稿与已发送邮件，可替换为真实邮箱后端。

use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::llm::ToolSpec;
use crate::memory::ToolCall;
use crate::tools::toolbox::{parse_args, spec_for};
use crate::tools::{ToolError, Toolbox};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, JsonSchema)]
pub struct ComposeArgs {
    /// Email address of the recipient
    pub recipient: String,
    /// Subject line
    pub subject: String,
    /// Full message body
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, JsonSchema)]
pub struct ReadArgs {
    /// Folder to read from: inbox, sent or drafts
    #[serde(default = "default_folder")]
    pub folder: String,
    /// Maximum number of emails to return
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_folder() -> String {
    "inbox".to_string()
}

fn default_limit() -> usize {
    5
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, JsonSchema)]
pub struct SearchArgs {
    /// Keywords, sender names or subjects to look for
    pub query: String,
}

/// 邮件 Worker 的命令
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmailCommand {
    Draft(ComposeArgs),
    Send(ComposeArgs),
    Read(ReadArgs),
    Search(SearchArgs),
}

impl EmailCommand {
    pub fn parse(call: &ToolCall) -> Result<Self, ToolError> {
        match call.name.as_str() {
            "email_draft" => Ok(Self::Draft(parse_args(call)?)),
            "email_send" => Ok(Self::Send(parse_args(call)?)),
            "email_read" => Ok(Self::Read(parse_args(call)?)),
            "email_search" => Ok(Self::Search(parse_args(call)?)),
            other => Err(ToolError::Unknown(other.to_string())),
        }
    }

    pub fn specs() -> Vec<ToolSpec> {
        vec![
            spec_for::<ComposeArgs>(
                "email_draft",
                "Create a draft email without sending it. Prefer this unless the user explicitly asked to send.",
            ),
            spec_for::<ComposeArgs>("email_send", "Send an email immediately."),
            spec_for::<ReadArgs>("email_read", "List recent emails in a folder."),
            spec_for::<SearchArgs>("email_search", "Search emails by keyword, sender or subject."),
        ]
    }
}

/// 一封邮件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEmail {
    pub id: String,
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl StoredEmail {
    fn header_line(&self) -> String {
        format!("[{}] From: {} To: {} Subject: {}", self.id, self.from, self.to, self.subject)
    }

    fn matches(&self, query: &str) -> bool {
        let q = query.to_lowercase();
        q.split_whitespace().all(|w| {
            self.subject.to_lowercase().contains(w)
                || self.from.to_lowercase().contains(w)
                || self.to.to_lowercase().contains(w)
                || self.body.to_lowercase().contains(w)
        })
    }
}

/// 邮件后端
#[async_trait]
pub trait EmailService: Send + Sync {
    async fn draft(&self, args: ComposeArgs) -> Result<String, String>;
    async fn send(&self, args: ComposeArgs) -> Result<String, String>;
    async fn read(&self, folder: &str, limit: usize) -> Result<String, String>;
    async fn search(&self, query: &str) -> Result<String, String>;
}

#[derive(Default)]
struct Folders {
    inbox: Vec<StoredEmail>,
    drafts: Vec<StoredEmail>,
    sent: Vec<StoredEmail>,
}

/// 内存沙箱邮箱
pub struct SandboxMailbox {
    owner: String,
    folders: RwLock<Folders>,
}

impl SandboxMailbox {
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            folders: RwLock::new(Folders::default()),
        }
    }

    /// 向收件箱投递一封邮件
    pub async fn deliver(&self, from: &str, subject: &str, body: &str) {
        let mut f = self.folders.write().await;
        let id = format!("in-{}", f.inbox.len() + 1);
        f.inbox.push(StoredEmail {
            id,
            from: from.to_string(),
            to: self.owner.clone(),
            subject: subject.to_string(),
            body: body.to_string(),
        });
    }

    pub async fn drafts(&self) -> Vec<StoredEmail> {
        self.folders.read().await.drafts.clone()
    }

    pub async fn sent(&self) -> Vec<StoredEmail> {
        self.folders.read().await.sent.clone()
    }

    fn compose(&self, id: String, args: ComposeArgs) -> StoredEmail {
        StoredEmail {
            id,
            from: self.owner.clone(),
            to: args.recipient,
            subject: args.subject,
            body: args.body,
        }
    }
}

fn validate_recipient(recipient: &str) -> Result<(), String> {
    if recipient.contains('@') && !recipient.trim().contains(' ') {
        Ok(())
    } else {
        Err(format!("'{}' is not a valid email address", recipient))
    }
}

#[async_trait]
impl EmailService for SandboxMailbox {
    async fn draft(&self, args: ComposeArgs) -> Result<String, String> {
        validate_recipient(&args.recipient)?;
        let mut f = self.folders.write().await;
        let email = self.compose(format!("draft-{}", f.drafts.len() + 1), args);
        let out = format!(
            "Draft created ({}). To: {} Subject: {}",
            email.id, email.to, email.subject
        );
        f.drafts.push(email);
        Ok(out)
    }

    async fn send(&self, args: ComposeArgs) -> Result<String, String> {
        validate_recipient(&args.recipient)?;
        let mut f = self.folders.write().await;
        let email = self.compose(format!("sent-{}", f.sent.len() + 1), args);
        let out = format!("Email sent to {} with subject '{}'", email.to, email.subject);
        f.sent.push(email);
        Ok(out)
    }

    async fn read(&self, folder: &str, limit: usize) -> Result<String, String> {
        let f = self.folders.read().await;
        let items = match folder.to_lowercase().as_str() {
            "inbox" => &f.inbox,
            "drafts" => &f.drafts,
            "sent" => &f.sent,
            other => return Err(format!("unknown folder '{}'", other)),
        };
        if items.is_empty() {
            return Ok(format!("No emails in {}.", folder));
        }
        Ok(items
            .iter()
            .rev()
            .take(limit)
            .map(StoredEmail::header_line)
            .collect::<Vec<_>>()
            .join("\n"))
    }

    async fn search(&self, query: &str) -> Result<String, String> {
        let f = self.folders.read().await;
        let hits: Vec<String> = f
            .inbox
            .iter()
            .chain(f.sent.iter())
            .chain(f.drafts.iter())
            .filter(|e| e.matches(query))
            .map(StoredEmail::header_line)
            .collect();
        if hits.is_empty() {
            Ok(format!("No emails matching '{}'.", query))
        } else {
            Ok(format!("Found emails matching '{}':\n{}", query, hits.join("\n")))
        }
    }
}

/// 邮件 Worker 的工具箱
pub struct EmailToolbox {
    service: Arc<dyn EmailService>,
}

impl EmailToolbox {
    pub fn new(service: Arc<dyn EmailService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl Toolbox for EmailToolbox {
    fn specs(&self) -> Vec<ToolSpec> {
        EmailCommand::specs()
    }

    async fn invoke(&self, call: &ToolCall) -> Result<String, ToolError> {
        let result = match EmailCommand::parse(call)? {
            EmailCommand::Draft(args) => self.service.draft(args).await,
            EmailCommand::Send(args) => self.service.send(args).await,
            EmailCommand::Read(args) => self.service.read(&args.folder, args.limit).await,
            EmailCommand::Search(args) => self.service.search(&args.query).await,
        };
        result.map_err(ToolError::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call(name: &str, args: serde_json::Value) -> ToolCall {
        ToolCall::new("c", name, args)
    }

    #[test]
    fn test_parse_defaults_and_unknown() {
        let cmd = EmailCommand::parse(&call("email_read", json!({}))).unwrap();
        assert_eq!(
            cmd,
            EmailCommand::Read(ReadArgs {
                folder: "inbox".into(),
                limit: 5
            })
        );
        assert!(matches!(
            EmailCommand::parse(&call("email_delete", json!({}))),
            Err(ToolError::Unknown(_))
        ));
    }

    #[tokio::test]
    async fn test_draft_is_not_sent() {
        let mailbox = Arc::new(SandboxMailbox::new("me@example.com"));
        let toolbox = EmailToolbox::new(mailbox.clone());
        let out = toolbox
            .invoke(&call(
                "email_draft",
                json!({"recipient": "bob@example.com", "subject": "Q3 report", "body": "Hi Bob"}),
            ))
            .await
            .unwrap();
        assert!(out.contains("Draft created"));
        assert_eq!(mailbox.drafts().await.len(), 1);
        assert!(mailbox.sent().await.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_recipient_fails() {
        let toolbox = EmailToolbox::new(Arc::new(SandboxMailbox::new("me@example.com")));
        let err = toolbox
            .invoke(&call(
                "email_send",
                json!({"recipient": "bob", "subject": "s", "body": "b"}),
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Failed(_)));
    }

    #[tokio::test]
    async fn test_search_and_read_inbox() {
        let mailbox = SandboxMailbox::new("me@example.com");
        mailbox.deliver("ana@example.com", "Invoice March", "Please pay").await;
        mailbox.deliver("news@shop.com", "Big sale", "50% off").await;
        let hits = mailbox.search("invoice").await.unwrap();
        assert!(hits.contains("Invoice March"));
        assert!(!hits.contains("Big sale"));
        let listing = mailbox.read("inbox", 1).await.unwrap();
        assert!(listing.contains("Big sale"));
        assert!(!listing.contains("Invoice"));
    }
}
