//! Filtering and paging over the audit trail.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::log::{list_log_files, parse_log_file_name, read_log_file};
use super::{AuditEntry, DeliveryStatus};
use crate::error::Result;
use crate::protocol::envelope::derive_correlation_id;
use crate::protocol::types::{MessageType, Priority};

/// Audit filters. Every set field must match.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuditQuery {
    /// Matches the sender or the recipient
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    /// Matches the message's conversation id (its own id for a root message)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub message_type: Option<MessageType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_status: Option<DeliveryStatus>,
    /// Inclusive lower bound on receive time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<DateTime<Utc>>,
    /// Inclusive upper bound on receive time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub until: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<usize>,
}

impl AuditQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    pub fn correlation(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    pub fn of_type(mut self, message_type: MessageType) -> Self {
        self.message_type = Some(message_type);
        self
    }

    pub fn page(mut self, offset: usize, limit: usize) -> Self {
        self.offset = Some(offset);
        self.limit = Some(limit);
        self
    }

    /// Whether one entry passes every filter (paging aside).
    pub fn matches(&self, entry: &AuditEntry) -> bool {
        let message = &entry.message;

        if let Some(agent_id) = &self.agent_id {
            if !message.involves(agent_id) {
                return false;
            }
        }
        if let Some(correlation_id) = &self.correlation_id {
            if derive_correlation_id(message) != *correlation_id {
                return false;
            }
        }
        if self.message_type.is_some_and(|t| t != message.message_type()) {
            return false;
        }
        if self.priority.is_some_and(|p| p != message.priority()) {
            return false;
        }
        if self.delivery_status.is_some_and(|s| s != entry.meta.delivery_status) {
            return false;
        }
        if self.since.is_some_and(|since| entry.meta.received_at < since) {
            return false;
        }
        if self.until.is_some_and(|until| entry.meta.received_at > until) {
            return false;
        }
        true
    }
}

/// One page of matching entries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    /// Matches before paging
    pub total_count: usize,
    pub entries: Vec<AuditEntry>,
    /// The filters that produced this result
    pub filters: AuditQuery,
}

/// Run a query over every audit file in `log_dir`.
///
/// Entries come back in log order. Files dated outside `since..=until`
/// are skipped without being read.
pub async fn query_log(filter: &AuditQuery, log_dir: impl AsRef<Path>) -> Result<QueryResult> {
    let since = filter.since.map(|t| t.date_naive());
    let until = filter.until.map(|t| t.date_naive());
    let offset = filter.offset.unwrap_or(0);
    let limit = filter.limit.unwrap_or(usize::MAX);

    let mut total_count = 0;
    let mut entries = Vec::new();

    for path in list_log_files(log_dir).await? {
        let in_range = path
            .file_name()
            .and_then(|n| n.to_str())
            .map_or(false, |n| is_file_in_date_range(n, since, until));
        if !in_range {
            continue;
        }

        for entry in read_log_file(&path).await? {
            if !filter.matches(&entry) {
                continue;
            }
            if total_count >= offset && entries.len() < limit {
                entries.push(entry);
            }
            total_count += 1;
        }
    }

    tracing::debug!("Audit query matched {} entries", total_count);
    Ok(QueryResult {
        total_count,
        entries,
        filters: filter.clone(),
    })
}

/// Day an audit file covers, from its name.
pub fn extract_date_from_filename(name: &str) -> Option<NaiveDate> {
    parse_log_file_name(name).map(|(date, _)| date)
}

/// Whether an audit file can hold entries between `since` and `until`
/// (both inclusive, either open). Names without a date are kept.
pub fn is_file_in_date_range(name: &str, since: Option<NaiveDate>, until: Option<NaiveDate>) -> bool {
    let Some(date) = extract_date_from_filename(name) else {
        return true;
    };
    since.map_or(true, |s| date >= s) && until.map_or(true, |u| date <= u)
}
