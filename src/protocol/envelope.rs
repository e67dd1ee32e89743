//! The A2A wire envelope and its builder.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::types::{AgentRef, MessageType, Priority, A2A_PROTOCOL_VERSION};

/// A message exchanged between agents.
///
/// Envelopes are immutable once built: fields are only readable. A correction
/// is sent as a new message carrying the same correlation id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct A2AMessage {
    protocol: String,
    message_id: String,
    timestamp: DateTime<Utc>,
    from: AgentRef,
    to: AgentRef,
    #[serde(rename = "type")]
    message_type: MessageType,
    priority: Priority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    correlation_id: Option<String>,
    payload: Value,
}

impl A2AMessage {
    /// Start building a message of the given type.
    pub fn builder(message_type: MessageType, from: AgentRef, to: AgentRef) -> EnvelopeBuilder {
        EnvelopeBuilder::new(message_type, from, to)
    }

    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn from(&self) -> &AgentRef {
        &self.from
    }

    pub fn to(&self) -> &AgentRef {
        &self.to
    }

    pub fn message_type(&self) -> MessageType {
        self.message_type
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// Whether this message is addressed to every agent.
    pub fn is_broadcast(&self) -> bool {
        self.to.is_broadcast()
    }

    /// Whether either end of the message is the given agent.
    pub fn involves(&self, agent_id: &str) -> bool {
        self.from.agent_id == agent_id || self.to.agent_id == agent_id
    }
}

/// Identifier that continues the conversation `message` belongs to.
///
/// This is the message's own correlation id when set, otherwise its message
/// id, so a reply to a root message threads into the chain the root started.
pub fn derive_correlation_id(message: &A2AMessage) -> String {
    message
        .correlation_id
        .clone()
        .unwrap_or_else(|| message.message_id.clone())
}

/// Builder for envelopes.
pub struct EnvelopeBuilder {
    message_type: MessageType,
    from: AgentRef,
    to: AgentRef,
    priority: Priority,
    correlation_id: Option<String>,
    payload: Value,
    message_id: Option<String>,
    timestamp: Option<DateTime<Utc>>,
}

impl EnvelopeBuilder {
    pub fn new(message_type: MessageType, from: AgentRef, to: AgentRef) -> Self {
        Self {
            message_type,
            from,
            to,
            priority: Priority::Normal,
            correlation_id: None,
            payload: Value::Object(Default::default()),
            message_id: None,
            timestamp: None,
        }
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    /// Set or clear the correlation id.
    pub fn maybe_correlation_id(mut self, id: Option<String>) -> Self {
        self.correlation_id = id;
        self
    }

    pub fn payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    /// Override the generated message id (replays and fixtures).
    pub fn message_id(mut self, id: impl Into<String>) -> Self {
        self.message_id = Some(id.into());
        self
    }

    /// Override the creation time (replays and fixtures).
    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Build the envelope, stamping the protocol version, id and time.
    pub fn build(self) -> A2AMessage {
        A2AMessage {
            protocol: A2A_PROTOCOL_VERSION.to_string(),
            message_id: self.message_id.unwrap_or_else(generate_id),
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
            from: self.from,
            to: self.to,
            message_type: self.message_type,
            priority: self.priority,
            correlation_id: self.correlation_id,
            payload: self.payload,
        }
    }
}

fn generate_id() -> String {
    ulid::Ulid::new().to_string()
}
