//! Agent-to-agent message protocol.
//!
//! - The versioned envelope every message travels in
//! - Typed payloads per message type
//! - Validation of untrusted input
//! - In-process agent mailboxes

pub mod envelope;
pub mod mailbox;
pub mod payload;
pub mod types;
pub mod validator;

pub use envelope::{derive_correlation_id, A2AMessage, EnvelopeBuilder};
pub use mailbox::{AgentMailbox, MailboxStats, MailboxStore};
pub use payload::{
    BroadcastPayload, KnowledgeSharePayload, ReviewRequestPayload, ReviewResponsePayload,
    StatusUpdatePayload, TaskRequestPayload, TaskResponsePayload,
};
pub use types::{AgentRef, MessageType, Priority, A2A_PROTOCOL_VERSION, BROADCAST_AGENT_ID};
pub use validator::{
    validate, EnvelopeValidator, StrictValidator, Validate, ValidationIssue, ValidationResult,
};
