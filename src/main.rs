//! Steward 命令行入口
//!
//! - `steward`：交互式对话；线程等待回答时，下一条输入即为回答
//! - `steward inbox <emails.json>`：批量处理来信（JSON 数组，元素含 subject / sender / body）

use std::path::PathBuf;

use anyhow::Context;
use steward::agents::{RunEvent, ThreadEvent};
use steward::config::load_config;
use steward::{InboundEmail, RunReply, Workflow, WorkflowBuilder};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

const HELP: &str = "Commands: /new  /threads  /pending  /resolve <id> <answer>  /dismiss <id>  /usage  /quit";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    steward::observability::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let config_path = std::env::var("STEWARD_CONFIG").ok().map(PathBuf::from);
    let cfg = load_config(config_path).context("Failed to load config")?;

    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(print_events(rx));
    let workflow = WorkflowBuilder::new(cfg)
        .with_events(tx)
        .build()
        .context("Failed to build workflow")?;

    match args.first().map(String::as_str) {
        Some("inbox") => {
            let path = args.get(1).context("usage: steward inbox <emails.json>")?;
            run_inbox(&workflow, path).await
        }
        Some(other) => anyhow::bail!("unknown command '{}'\nusage: steward [inbox <emails.json>]", other),
        None => run_chat(&workflow).await,
    }
}

async fn run_inbox(workflow: &Workflow, path: &str) -> anyhow::Result<()> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path))?;
    let emails: Vec<InboundEmail> = serde_json::from_str(&raw).context("Invalid emails JSON")?;
    let subjects: Vec<String> = emails.iter().map(|e| e.subject.clone()).collect();

    for (subject, result) in subjects.iter().zip(workflow.process_inbox(emails, None).await) {
        match result {
            Ok(reply) => println!("[{}] {}", subject, describe(&reply)),
            Err(e) => println!("[{}] error: {}", subject, e),
        }
    }

    let pending = workflow.list_pending().await?;
    if !pending.is_empty() {
        println!("\n{} question(s) waiting for you:", pending.len());
        for item in pending {
            println!("  {}  {}", item.id, item.question);
        }
    }
    println!("\n{}", usage_report(workflow));
    Ok(())
}

async fn run_chat(workflow: &Workflow) -> anyhow::Result<()> {
    println!("Steward ready. {}", HELP);
    let mut thread_id = uuid::Uuid::new_v4().to_string();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut parts = line.splitn(3, ' ');
        match parts.next().unwrap_or_default() {
            "/quit" | "/exit" => break,
            "/help" => println!("{}", HELP),
            "/new" => {
                thread_id = uuid::Uuid::new_v4().to_string();
                println!("New thread {}", thread_id);
            }
            "/threads" => {
                for t in workflow.list_threads().await? {
                    let waiting = t.pending_question.map(|q| format!(" (waiting: {})", q)).unwrap_or_default();
                    println!("  {}  {}  {}{}", t.thread_id, t.workflow_status, t.input, waiting);
                }
            }
            "/pending" => {
                for item in workflow.list_pending().await? {
                    println!("  {}  {}", item.id, item.question);
                }
            }
            "/resolve" => match (parts.next(), parts.next()) {
                (Some(id), Some(answer)) => match workflow.resolve_interrupt(id, answer).await {
                    Ok(reply) => println!("{}", describe(&reply)),
                    Err(e) => println!("error: {}", e),
                },
                _ => println!("usage: /resolve <id> <answer>"),
            },
            "/usage" => println!("{}", usage_report(workflow)),
            "/dismiss" => match parts.next() {
                Some(id) => match workflow.dismiss_interrupt(id).await {
                    Ok(()) => println!("Dismissed {}", id),
                    Err(e) => println!("error: {}", e),
                },
                None => println!("usage: /dismiss <id>"),
            },
            _ => match workflow.start(line, Some(&thread_id)).await {
                Ok(reply) => println!("{}", describe(&reply)),
                Err(e) => println!("error: {}", e),
            },
        }
    }
    Ok(())
}

/// 各组件 token 用量，末行为合计
fn usage_report(workflow: &Workflow) -> String {
    let usage = workflow.token_usage();
    if usage.is_empty() {
        return "No model requests yet.".to_string();
    }
    let mut lines = vec![format!(
        "  {:<16} {:>8} {:>8} {:>8} {:>8}",
        "component", "prompt", "output", "total", "requests"
    )];
    let (mut prompt, mut completion, mut requests) = (0, 0, 0);
    for (slot, u) in &usage {
        lines.push(format!(
            "  {:<16} {:>8} {:>8} {:>8} {:>8}",
            slot.as_str(),
            u.prompt_tokens,
            u.completion_tokens,
            u.total_tokens(),
            u.requests
        ));
        prompt += u.prompt_tokens;
        completion += u.completion_tokens;
        requests += u.requests;
    }
    lines.push(format!(
        "  {:<16} {:>8} {:>8} {:>8} {:>8}",
        "all",
        prompt,
        completion,
        prompt + completion,
        requests
    ));
    lines.join("\n")
}

fn describe(reply: &RunReply) -> String {
    if reply.is_interrupt() {
        return format!("? {}", reply.response);
    }
    let status = reply
        .workflow_status
        .map(|s| s.to_string())
        .unwrap_or_default();
    format!("[{}] {}", status, reply.response)
}

async fn print_events(mut rx: mpsc::UnboundedReceiver<ThreadEvent>) {
    while let Some(ev) = rx.recv().await {
        let line = match ev.event {
            RunEvent::PlanCreated { steps } => steps
                .iter()
                .map(|s| format!("  {}. {} ({})", s.id, s.description, s.assigned_agent))
                .collect::<Vec<_>>()
                .join("\n"),
            RunEvent::StepStarted { step_id, agent, .. } => format!("  -> step {} ({})", step_id, agent),
            RunEvent::ToolCall { tool, .. } => format!("     tool {}", tool),
            RunEvent::StepResolved { step_id, status } => format!("  <- step {} {}", step_id, status),
            RunEvent::BudgetExhausted { agent, iterations } => {
                format!("  !! {} used all {} tool iterations", agent, iterations)
            }
            _ => continue,
        };
        println!("{}", line);
    }
}
