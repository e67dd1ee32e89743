//! Message types for the agent-to-agent protocol.

use serde::{Deserialize, Serialize};

/// Protocol version tag carried by every envelope.
pub const A2A_PROTOCOL_VERSION: &str = "org.a2a.v1";

/// Agent id used as the recipient of organization-wide broadcasts.
pub const BROADCAST_AGENT_ID: &str = "*";

/// Message type classification.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    /// Ask another agent to take on a task
    TaskRequest,
    /// Accept, decline, or report the outcome of a task
    TaskResponse,
    /// Ask for a review of finished work
    ReviewRequest,
    /// Review verdict
    ReviewResponse,
    /// Progress report on ongoing work
    StatusUpdate,
    /// Share a discovery with other agents
    KnowledgeShare,
    /// Organization-wide announcement
    Broadcast,
}

impl MessageType {
    pub const ALL: [MessageType; 7] = [
        MessageType::TaskRequest,
        MessageType::TaskResponse,
        MessageType::ReviewRequest,
        MessageType::ReviewResponse,
        MessageType::StatusUpdate,
        MessageType::KnowledgeShare,
        MessageType::Broadcast,
    ];

    /// Wire name of the type.
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::TaskRequest => "task_request",
            MessageType::TaskResponse => "task_response",
            MessageType::ReviewRequest => "review_request",
            MessageType::ReviewResponse => "review_response",
            MessageType::StatusUpdate => "status_update",
            MessageType::KnowledgeShare => "knowledge_share",
            MessageType::Broadcast => "broadcast",
        }
    }

    /// Parse a wire name; `None` for unknown kinds.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == s)
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MessageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("Unknown message type: {}", s))
    }
}

/// Message priority levels.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low = 0,
    #[default]
    Normal = 1,
    High = 2,
}

impl Priority {
    pub const ALL: [Priority; 3] = [Priority::Low, Priority::Normal, Priority::High];

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.as_str() == s)
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("Unknown priority: {}", s))
    }
}

/// A message participant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AgentRef {
    /// Agent ID, or `*` for a broadcast target
    pub agent_id: String,
    /// Organizational role (engineer, reviewer, ...)
    pub role: String,
    /// Session the agent is sending from (optional)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_key: Option<String>,
}

impl AgentRef {
    pub fn new(agent_id: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            role: role.into(),
            session_key: None,
        }
    }

    /// The broadcast recipient (`*`).
    pub fn broadcast() -> Self {
        Self::new(BROADCAST_AGENT_ID, BROADCAST_AGENT_ID)
    }

    pub fn with_session_key(mut self, session_key: impl Into<String>) -> Self {
        self.session_key = Some(session_key.into());
        self
    }

    pub fn is_broadcast(&self) -> bool {
        self.agent_id == BROADCAST_AGENT_ID
    }
}
