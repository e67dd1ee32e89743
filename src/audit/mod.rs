//! Append-only audit trail of routed messages.
//!
//! Each entry records the message exactly as routed plus delivery metadata.
//! Entries are written as JSON lines to day-keyed files and are never
//! rewritten through this API.

pub mod log;
pub mod query;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::routing::RouteResult;
use crate::error::Result;
use crate::protocol::envelope::A2AMessage;

pub use log::{list_log_files, read_log_file, AuditLog, LogOptions, DEFAULT_MAX_FILE_BYTES};
pub use query::{extract_date_from_filename, is_file_in_date_range, query_log, AuditQuery, QueryResult};

/// Receives one record per delivery attempt.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, message: &A2AMessage, outcome: &RouteResult) -> Result<()>;
}

/// Whether the transport accepted the message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Delivered,
    Failed,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Delivered => "delivered",
            DeliveryStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "delivered" => Some(DeliveryStatus::Delivered),
            "failed" => Some(DeliveryStatus::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Delivery metadata stored next to each message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuditMeta {
    pub received_at: DateTime<Utc>,
    pub delivery_status: DeliveryStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_time_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One line of an audit file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditEntry {
    pub message: A2AMessage,
    pub meta: AuditMeta,
}
