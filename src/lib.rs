//! a2a-relay library root.
//!
//! Validated, rate limited, circuit broken and audited messaging between
//! autonomous agents.

pub mod audit;
pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod protocol;
pub mod sdk;

pub use audit::{query_log, AuditLog, AuditQuery, AuditSink, QueryResult};
pub use cli::Commands;
pub use config::{load_settings, Settings};
pub use core::{A2ARouter, Deliver, RouteResult, RouteStatus, RouterOptions};
pub use error::{Error, Result};
pub use protocol::{A2AMessage, AgentRef, MessageType, Priority};
pub use sdk::{A2ASdk, AgentIdentity, MessageSender};
