//! CLI commands for a2a-relay using clap.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::audit::{list_log_files, query_log, read_log_file, AuditLog, AuditQuery, AuditSink, DeliveryStatus};
use crate::config::{get_settings_path, load_settings_from, save_settings, Settings};
use crate::core::routing::{A2ARouter, Deliver, RouteStatus};
use crate::protocol::envelope::A2AMessage;
use crate::protocol::mailbox::{AgentMailbox, MailboxStore};
use crate::protocol::payload::{
    Complexity, StatusUpdatePayload, TaskAction, TaskRequestPayload, TaskResponsePayload,
    TaskResult, TaskType, WorkStatus,
};
use crate::protocol::types::{AgentRef, MessageType, Priority};
use crate::protocol::validator::{EnvelopeValidator, StrictValidator, Validate};
use crate::sdk::{A2ASdk, AgentIdentity, SendOptions};

/// a2a-relay - validated, rate limited and audited messaging between agents.
#[derive(Parser)]
#[command(name = "a2a-relay")]
#[command(version)]
#[command(about = "Agent-to-agent message relay", long_about = None)]
pub struct Commands {
    /// Settings file (defaults to ~/.a2a-relay/settings.json)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Validate messages in a JSON file (one object, an array, or JSON lines)
    Validate {
        file: PathBuf,
        /// Also check payloads against their per-type schema
        #[arg(long, default_value_t = false)]
        strict: bool,
    },

    /// Route messages from a file into the local mailboxes
    Route { file: PathBuf },

    /// Search the audit log
    Query {
        /// Sender or recipient
        #[arg(long)]
        agent: Option<String>,
        #[arg(long)]
        correlation: Option<String>,
        #[arg(long = "type")]
        message_type: Option<String>,
        #[arg(long)]
        priority: Option<String>,
        /// delivered | failed
        #[arg(long)]
        status: Option<String>,
        /// RFC 3339 time or YYYY-MM-DD
        #[arg(long)]
        since: Option<String>,
        /// RFC 3339 time or YYYY-MM-DD (whole day)
        #[arg(long)]
        until: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        offset: Option<usize>,
        #[arg(long)]
        log_dir: Option<PathBuf>,
        /// Print the raw query result as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// List audit log files
    Logs {
        #[arg(long)]
        log_dir: Option<PathBuf>,
    },

    /// Show an agent's mailbox
    Inbox {
        agent: String,
        /// Only messages from this sender
        #[arg(long)]
        from: Option<String>,
        /// Only messages in this conversation
        #[arg(long)]
        correlation: Option<String>,
        /// Remove a handled message
        #[arg(long)]
        take: Option<String>,
    },

    /// Run a task lifecycle between two agents through the full pipeline
    Demo {
        /// Audit directory for the scenario (defaults to a scratch directory)
        #[arg(long)]
        log_dir: Option<PathBuf>,
    },

    /// Show effective settings
    Config {
        /// Write default settings if none exist
        #[arg(long, default_value_t = false)]
        init: bool,
    },
}

impl Commands {
    /// Run the command.
    pub async fn run(&self) -> Result<()> {
        let settings_path = match &self.config {
            Some(path) => path.clone(),
            None => get_settings_path()?,
        };

        match &self.command {
            Command::Config { init } => return cmd_config(&settings_path, *init).await,
            Command::Validate { file, strict } => return cmd_validate(file, *strict).await,
            _ => {}
        }

        let settings = load_or_default(&settings_path)?;
        match &self.command {
            Command::Route { file } => cmd_route(&settings, file).await,
            Command::Query {
                agent,
                correlation,
                message_type,
                priority,
                status,
                since,
                until,
                limit,
                offset,
                log_dir,
                json,
            } => {
                let filter = AuditQuery {
                    agent_id: agent.clone(),
                    correlation_id: correlation.clone(),
                    message_type: message_type.as_deref().map(parse_message_type).transpose()?,
                    priority: priority.as_deref().map(parse_priority).transpose()?,
                    delivery_status: status.as_deref().map(parse_status).transpose()?,
                    since: since.as_deref().map(|s| parse_time(s, false)).transpose()?,
                    until: until.as_deref().map(|s| parse_time(s, true)).transpose()?,
                    limit: *limit,
                    offset: *offset,
                };
                let dir = resolve_log_dir(&settings, log_dir.as_deref())?;
                cmd_query(&filter, &dir, *json).await
            }
            Command::Logs { log_dir } => {
                cmd_logs(&resolve_log_dir(&settings, log_dir.as_deref())?).await
            }
            Command::Inbox {
                agent,
                from,
                correlation,
                take,
            } => {
                cmd_inbox(
                    &settings,
                    agent,
                    from.as_deref(),
                    correlation.as_deref(),
                    take.as_deref(),
                )
                .await
            }
            Command::Demo { log_dir } => {
                let (_scratch, dir) = demo_log_dir(log_dir.as_deref())?;
                cmd_demo(&settings, &dir).await
            }
            Command::Config { .. } | Command::Validate { .. } => Ok(()),
        }
    }
}

// Command implementations

fn load_or_default(path: &Path) -> Result<Settings> {
    if path.exists() {
        Ok(load_settings_from(path)?)
    } else {
        tracing::debug!("No settings at {}, using defaults", path.display());
        Ok(Settings::default())
    }
}

fn resolve_log_dir(settings: &Settings, explicit: Option<&Path>) -> Result<PathBuf> {
    match explicit {
        Some(dir) => Ok(dir.to_path_buf()),
        None => Ok(settings.audit_log_dir()?),
    }
}

/// Demo traffic stays out of the real audit trail unless a directory is given.
/// The returned guard removes the scratch directory when dropped.
fn demo_log_dir(explicit: Option<&Path>) -> Result<(Option<tempfile::TempDir>, PathBuf)> {
    match explicit {
        Some(dir) => Ok((None, dir.to_path_buf())),
        None => {
            let scratch = tempfile::Builder::new()
                .prefix("a2a-relay-demo")
                .tempdir()
                .context("Failed to create a scratch audit directory")?;
            let dir = scratch.path().to_path_buf();
            Ok((Some(scratch), dir))
        }
    }
}

fn build_audit(settings: &Settings, log_dir: &Path) -> Option<Arc<dyn AuditSink>> {
    if !settings.audit.enabled {
        return None;
    }
    let max_file_bytes = settings.audit.max_file_mb.saturating_mul(1024 * 1024);
    let mut log = AuditLog::new(log_dir).with_max_file_bytes(max_file_bytes);
    if let Some(name) = &settings.audit.processed_by {
        log = log.with_processed_by(name);
    }
    Some(Arc::new(log))
}

/// Read one object, an array of objects, or JSON lines.
fn read_messages(file: &Path) -> Result<Vec<Value>> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;

    if let Ok(value) = serde_json::from_str::<Value>(&content) {
        return Ok(match value {
            Value::Array(items) => items,
            other => vec![other],
        });
    }

    content
        .lines()
        .filter(|l| !l.trim().is_empty())
        .enumerate()
        .map(|(i, line)| {
            serde_json::from_str::<Value>(line)
                .with_context(|| format!("Line {} is not valid JSON", i + 1))
        })
        .collect()
}

async fn cmd_validate(file: &Path, strict: bool) -> Result<()> {
    let validator: Box<dyn Validate> = if strict {
        Box::new(StrictValidator)
    } else {
        Box::new(EnvelopeValidator)
    };

    let mut invalid = 0;
    for (i, raw) in read_messages(file)?.iter().enumerate() {
        match validator.validate(raw) {
            Ok(message) => println!(
                "#{} ok: {} {} -> {} ({})",
                i + 1,
                message.message_type(),
                message.from().agent_id,
                message.to().agent_id,
                message.message_id()
            ),
            Err(issues) => {
                invalid += 1;
                println!("#{} invalid:", i + 1);
                for issue in issues {
                    println!("  {} [{}]", issue, issue.rule);
                }
            }
        }
    }

    if invalid > 0 {
        anyhow::bail!("{} invalid message(s)", invalid);
    }
    Ok(())
}

async fn cmd_route(settings: &Settings, file: &Path) -> Result<()> {
    let mailboxes = Arc::new(MailboxStore::new(settings.mailbox_dir()?)?);
    let audit = build_audit(settings, &settings.audit_log_dir()?);
    let router = A2ARouter::new(settings.router_options(mailboxes, audit));

    for raw in read_messages(file)? {
        let result = router.route(&raw).await;
        println!("{}", serde_json::to_string(&result)?);
    }

    let metrics = router.metrics();
    println!(
        "routed={} delivered={} failed={} rate_limited={} circuit_open={} invalid={}",
        metrics.total_routed,
        metrics.total_delivered,
        metrics.total_failed,
        metrics.total_rate_limited,
        metrics.total_circuit_open,
        metrics.total_validation_failed
    );
    Ok(())
}

async fn cmd_query(filter: &AuditQuery, log_dir: &Path, json: bool) -> Result<()> {
    let result = query_log(filter, log_dir).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    println!(
        "{} matching entries (showing {}) in {}",
        result.total_count,
        result.entries.len(),
        log_dir.display()
    );
    for entry in &result.entries {
        let message = &entry.message;
        println!(
            "  {} {:<9} {:<16} {} -> {} [{}] {}",
            entry.meta.received_at.format("%Y-%m-%d %H:%M:%S"),
            entry.meta.delivery_status,
            message.message_type(),
            message.from().agent_id,
            message.to().agent_id,
            message.priority(),
            message.message_id()
        );
    }
    Ok(())
}

async fn cmd_logs(log_dir: &Path) -> Result<()> {
    let files = list_log_files(log_dir).await?;
    if files.is_empty() {
        println!("No audit logs in {}", log_dir.display());
        return Ok(());
    }

    println!("Audit logs in {}:", log_dir.display());
    for file in files {
        let size = tokio::fs::metadata(&file).await.map(|m| m.len()).unwrap_or(0);
        let entries = read_log_file(&file).await?.len();
        let name = file.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
        println!("  {:<28} {:>8} entries {:>12} bytes", name, entries, size);
    }
    Ok(())
}

/// Messages in `mailbox` matching the optional sender and conversation.
fn select_messages<'a>(
    mailbox: &'a AgentMailbox,
    from: Option<&str>,
    correlation: Option<&str>,
) -> Vec<&'a A2AMessage> {
    let mut messages = match from {
        Some(sender) => mailbox.from_agent(sender),
        None => mailbox.inbox.iter().collect(),
    };
    if let Some(correlation_id) = correlation {
        let chain: HashSet<&str> = mailbox
            .in_conversation(correlation_id)
            .into_iter()
            .map(|m| m.message_id())
            .collect();
        messages.retain(|m| chain.contains(m.message_id()));
    }
    messages
}

async fn cmd_inbox(
    settings: &Settings,
    agent: &str,
    from: Option<&str>,
    correlation: Option<&str>,
    take: Option<&str>,
) -> Result<()> {
    let store = MailboxStore::new(settings.mailbox_dir()?)?;

    if let Some(message_id) = take {
        match store.take(agent, message_id)? {
            Some(message) => println!("Removed {} from {}", message.message_id(), agent),
            None => println!("No message {} in {}", message_id, agent),
        }
        return Ok(());
    }

    let mailbox = store.get_mailbox(agent)?;
    let messages = select_messages(&mailbox, from, correlation);
    println!(
        "Inbox for {} ({} of {} messages):",
        agent,
        messages.len(),
        mailbox.inbox.len()
    );
    for message in messages {
        println!(
            "  {} {:<16} from {} [{}] {}",
            message.timestamp().format("%Y-%m-%d %H:%M:%S"),
            message.message_type(),
            message.from().agent_id,
            message.priority(),
            message.message_id()
        );
    }
    Ok(())
}

async fn cmd_demo(settings: &Settings, log_dir: &Path) -> Result<()> {
    let mailboxes = Arc::new(MailboxStore::in_memory());
    let deliver: Arc<dyn Deliver> = mailboxes.clone();
    let router = Arc::new(A2ARouter::new(
        settings.router_options(deliver, build_audit(settings, log_dir)),
    ));

    let lead = A2ASdk::for_agent(AgentIdentity::new("lead", "CEO"), router.clone());
    let worker = A2ASdk::for_agent(AgentIdentity::new("worker", "Engineer"), router.clone());
    let to_lead = AgentRef::new("lead", "CEO");

    let request = lead
        .send_task_request(
            SendOptions::new(
                AgentRef::new("worker", "Engineer"),
                TaskRequestPayload {
                    task_id: "demo-001".to_string(),
                    title: "Write release notes".to_string(),
                    description: "Summarize the changes since the last tag".to_string(),
                    task_type: TaskType::Documentation,
                    complexity: Complexity::Low,
                    deadline: None,
                    context: None,
                    acceptance_criteria: None,
                },
            )
            .priority(Priority::High),
        )
        .await?;
    let chain = request.reply_correlation_id();
    report("task_request", &request.outcome.status);

    let steps = [
        (
            MessageType::TaskResponse,
            worker
                .send_task_response(
                    SendOptions::new(to_lead.clone(), TaskResponsePayload::new("demo-001", TaskAction::Accepted))
                        .correlation_id(&chain),
                )
                .await?,
        ),
        (
            MessageType::StatusUpdate,
            worker
                .send_status_update(
                    SendOptions::new(
                        to_lead.clone(),
                        StatusUpdatePayload::new(WorkStatus::InProgress, "Drafted the summary").for_task("demo-001"),
                    )
                    .correlation_id(&chain),
                )
                .await?,
        ),
        (
            MessageType::TaskResponse,
            worker
                .send_task_response(
                    SendOptions::new(
                        to_lead,
                        TaskResponsePayload::new("demo-001", TaskAction::Completed).with_result(TaskResult {
                            summary: Some("Release notes written".to_string()),
                            ..Default::default()
                        }),
                    )
                    .correlation_id(&chain),
                )
                .await?,
        ),
    ];
    for (message_type, sent) in &steps {
        report(message_type.as_str(), &sent.outcome.status);
    }

    println!("\nlead inbox: {} messages", mailboxes.inbox("lead")?.len());
    println!("worker inbox: {} messages", mailboxes.inbox("worker")?.len());

    let metrics = router.metrics();
    println!(
        "metrics: routed={} delivered={} failed={}",
        metrics.total_routed, metrics.total_delivered, metrics.total_failed
    );

    if settings.audit.enabled {
        let audit = query_log(&AuditQuery::new().correlation(&chain), log_dir).await?;
        println!("audit entries for conversation {}: {}", chain, audit.total_count);
    }
    Ok(())
}

fn report(step: &str, status: &RouteStatus) {
    println!("  {:<14} {}", step, status);
}

async fn cmd_config(path: &Path, init: bool) -> Result<()> {
    if init {
        if path.exists() {
            println!("Settings already exist at {}", path.display());
        } else {
            save_settings(&Settings::default(), path)?;
            println!("Wrote default settings to {}", path.display());
        }
    }

    let settings = load_or_default(path)?;
    println!("{}", serde_json::to_string_pretty(&settings)?);
    Ok(())
}

fn parse_message_type(s: &str) -> Result<MessageType> {
    MessageType::parse(s).ok_or_else(|| anyhow::anyhow!("Unknown message type: {}", s))
}

fn parse_priority(s: &str) -> Result<Priority> {
    Priority::parse(s).ok_or_else(|| anyhow::anyhow!("Unknown priority: {}", s))
}

fn parse_status(s: &str) -> Result<DeliveryStatus> {
    DeliveryStatus::parse(s).ok_or_else(|| anyhow::anyhow!("Unknown delivery status: {}", s))
}

/// RFC 3339, or a bare date taken as the start (or end) of that UTC day.
fn parse_time(s: &str, end_of_day: bool) -> Result<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Ok(t.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .with_context(|| format!("Invalid time '{}': expected RFC 3339 or YYYY-MM-DD", s))?;
    let time = if end_of_day {
        date.and_hms_milli_opt(23, 59, 59, 999)
    } else {
        date.and_hms_opt(0, 0, 0)
    };
    time.map(|t| t.and_utc())
        .ok_or_else(|| anyhow::anyhow!("Invalid time '{}'", s))
}
