//! Agent mailboxes: an in-process transport for routed messages.
//!
//! Each agent gets an inbox. Broadcasts delivered logically land in the
//! shared `"*"` mailbox. With a base path, every delivery is also appended
//! to `<base>/mailboxes/<agent>.jsonl` and reloaded on first access.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::envelope::A2AMessage;
use super::types::BROADCAST_AGENT_ID;
use crate::core::lock;
use crate::core::routing::{Deliver, DeliveryOutcome};
use crate::error::Result;

/// Maximum messages per mailbox before pruning.
const MAX_MAILBOX_SIZE: usize = 1000;

/// Mailbox directory name.
const MAILBOX_DIR: &str = "mailboxes";

/// Messages received by one agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentMailbox {
    pub agent_id: String,
    /// Received messages, oldest first
    pub inbox: Vec<A2AMessage>,
    pub total_received: u64,
    pub last_activity: Option<DateTime<Utc>>,
}

impl AgentMailbox {
    pub fn new(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            inbox: Vec::new(),
            total_received: 0,
            last_activity: None,
        }
    }

    /// Add a message, pruning if the mailbox is full.
    pub fn deliver(&mut self, message: A2AMessage) {
        self.inbox.push(message);
        self.total_received += 1;
        self.last_activity = Some(Utc::now());
        self.prune_if_needed();
    }

    /// Messages from a specific sender.
    pub fn from_agent(&self, agent_id: &str) -> Vec<&A2AMessage> {
        self.inbox
            .iter()
            .filter(|m| m.from().agent_id == agent_id)
            .collect()
    }

    /// Messages continuing a conversation.
    pub fn in_conversation(&self, correlation_id: &str) -> Vec<&A2AMessage> {
        self.inbox
            .iter()
            .filter(|m| super::envelope::derive_correlation_id(m) == correlation_id)
            .collect()
    }

    /// Highest priority message, oldest first among equals.
    pub fn next_pending(&self) -> Option<&A2AMessage> {
        self.inbox.iter().max_by(|a, b| {
            a.priority()
                .cmp(&b.priority())
                .then_with(|| b.timestamp().cmp(&a.timestamp()))
        })
    }

    /// Remove a message once the agent has handled it.
    pub fn take(&mut self, message_id: &str) -> Option<A2AMessage> {
        let pos = self.inbox.iter().position(|m| m.message_id() == message_id)?;
        self.last_activity = Some(Utc::now());
        Some(self.inbox.remove(pos))
    }

    /// Drop the lowest priority, oldest messages beyond the size limit.
    fn prune_if_needed(&mut self) {
        while self.inbox.len() > MAX_MAILBOX_SIZE {
            let victim = self
                .inbox
                .iter()
                .enumerate()
                .min_by(|(_, a), (_, b)| {
                    a.priority()
                        .cmp(&b.priority())
                        .then_with(|| a.timestamp().cmp(&b.timestamp()))
                })
                .map(|(i, _)| i);
            match victim {
                Some(i) => {
                    let dropped = self.inbox.remove(i);
                    tracing::debug!(
                        "Pruned {} from full mailbox {}",
                        dropped.message_id(),
                        self.agent_id
                    );
                }
                None => break,
            }
        }
    }

    pub fn stats(&self, online: bool) -> MailboxStats {
        MailboxStats {
            agent_id: self.agent_id.clone(),
            inbox_count: self.inbox.len(),
            total_received: self.total_received,
            last_activity: self.last_activity,
            online,
        }
    }
}

/// Mailbox statistics.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MailboxStats {
    pub agent_id: String,
    pub inbox_count: usize,
    pub total_received: u64,
    pub last_activity: Option<DateTime<Utc>>,
    pub online: bool,
}

#[derive(Debug, Default)]
struct StoreState {
    mailboxes: HashMap<String, AgentMailbox>,
    registered: HashSet<String>,
    offline: HashSet<String>,
}

/// Every agent's mailbox, optionally persisted.
#[derive(Debug)]
pub struct MailboxStore {
    /// `None` keeps mailboxes in memory only
    base_path: Option<PathBuf>,
    state: Mutex<StoreState>,
}

impl MailboxStore {
    /// Store persisted under `<base_path>/mailboxes`.
    pub fn new(base_path: impl AsRef<Path>) -> Result<Self> {
        let base_path = base_path.as_ref().join(MAILBOX_DIR);
        fs::create_dir_all(&base_path)?;
        Ok(Self {
            base_path: Some(base_path),
            state: Mutex::new(StoreState::default()),
        })
    }

    pub fn in_memory() -> Self {
        Self {
            base_path: None,
            state: Mutex::new(StoreState::default()),
        }
    }

    /// Make an agent known, so fan-out broadcasts reach it.
    pub fn register(&self, agent_id: &str) {
        lock(&self.state).registered.insert(agent_id.to_string());
    }

    /// Mark an agent unreachable (or reachable again).
    pub fn set_offline(&self, agent_id: &str, offline: bool) {
        let mut state = lock(&self.state);
        if offline {
            state.offline.insert(agent_id.to_string());
        } else {
            state.offline.remove(agent_id);
        }
    }

    /// Snapshot of an agent's mailbox.
    pub fn get_mailbox(&self, agent_id: &str) -> Result<AgentMailbox> {
        let mut state = lock(&self.state);
        Ok(self.mailbox_mut(&mut state, agent_id)?.clone())
    }

    /// Messages waiting for an agent, oldest first.
    pub fn inbox(&self, agent_id: &str) -> Result<Vec<A2AMessage>> {
        Ok(self.get_mailbox(agent_id)?.inbox)
    }

    /// Remove a handled message and rewrite the agent's file.
    pub fn take(&self, agent_id: &str, message_id: &str) -> Result<Option<A2AMessage>> {
        let mut state = lock(&self.state);
        let mailbox = self.mailbox_mut(&mut state, agent_id)?;
        let taken = mailbox.take(message_id);
        if taken.is_some() {
            let mailbox = mailbox.clone();
            self.compact(&mailbox)?;
        }
        Ok(taken)
    }

    /// Statistics for every loaded mailbox.
    pub fn all_stats(&self) -> Vec<MailboxStats> {
        let state = lock(&self.state);
        let mut stats: Vec<MailboxStats> = state
            .mailboxes
            .values()
            .map(|m| m.stats(!state.offline.contains(&m.agent_id)))
            .collect();
        stats.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));
        stats
    }

    fn mailbox_mut<'a>(
        &self,
        state: &'a mut StoreState,
        agent_id: &str,
    ) -> Result<&'a mut AgentMailbox> {
        if !state.mailboxes.contains_key(agent_id) {
            let mailbox = self.load_mailbox(agent_id)?;
            state.mailboxes.insert(agent_id.to_string(), mailbox);
        }
        state
            .mailboxes
            .get_mut(agent_id)
            .ok_or_else(|| crate::error::Error::NotFound(format!("mailbox {}", agent_id)))
    }

    fn mailbox_path(&self, agent_id: &str) -> Option<PathBuf> {
        let name = if agent_id == BROADCAST_AGENT_ID {
            "_broadcast".to_string()
        } else {
            agent_id.replace(['/', '\\'], "_")
        };
        self.base_path
            .as_ref()
            .map(|base| base.join(format!("{}.jsonl", name)))
    }

    /// Rebuild a mailbox from its file, one message per line.
    fn load_mailbox(&self, agent_id: &str) -> Result<AgentMailbox> {
        let mut mailbox = AgentMailbox::new(agent_id);
        let Some(path) = self.mailbox_path(agent_id) else {
            return Ok(mailbox);
        };
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(mailbox),
            Err(e) => return Err(e.into()),
        };

        for line in content.lines().filter(|l| !l.trim().is_empty()) {
            match serde_json::from_str::<A2AMessage>(line) {
                Ok(message) => mailbox.deliver(message),
                Err(e) => tracing::warn!("Skipping bad mailbox line in {}: {}", path.display(), e),
            }
        }
        mailbox.last_activity = None;
        Ok(mailbox)
    }

    fn append(&self, agent_id: &str, message: &A2AMessage) -> Result<()> {
        let Some(path) = self.mailbox_path(agent_id) else {
            return Ok(());
        };
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        writeln!(file, "{}", serde_json::to_string(message)?)?;
        Ok(())
    }

    /// Rewrite a mailbox file to hold exactly the current inbox.
    fn compact(&self, mailbox: &AgentMailbox) -> Result<()> {
        let Some(path) = self.mailbox_path(&mailbox.agent_id) else {
            return Ok(());
        };
        let mut content = String::new();
        for message in &mailbox.inbox {
            content.push_str(&serde_json::to_string(message)?);
            content.push('\n');
        }
        fs::write(&path, content)?;
        Ok(())
    }
}

#[async_trait]
impl Deliver for MailboxStore {
    async fn deliver(&self, target_agent_id: &str, message: &A2AMessage) -> Result<DeliveryOutcome> {
        let mut state = lock(&self.state);
        if state.offline.contains(target_agent_id) {
            return Ok(DeliveryOutcome::failed(format!(
                "Agent {} is offline",
                target_agent_id
            )));
        }

        // Load before appending so the new line is not read back twice.
        let mailbox = self.mailbox_mut(&mut state, target_agent_id)?;
        self.append(target_agent_id, message)?;
        mailbox.deliver(message.clone());
        if target_agent_id != BROADCAST_AGENT_ID {
            state.registered.insert(target_agent_id.to_string());
        }
        Ok(DeliveryOutcome::delivered())
    }

    async fn known_agents(&self) -> Vec<String> {
        let state = lock(&self.state);
        let mut agents: Vec<String> = state.registered.iter().cloned().collect();
        agents.sort();
        agents
    }
}
