//! JSON-lines audit files.
//!
//! Files live in one directory and are named `a2a-YYYY-MM-DD.jsonl` after the
//! UTC day an entry was received. A file that reaches the size limit is
//! followed by `a2a-YYYY-MM-DD.1.jsonl`, `.2`, and so on.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use super::{AuditEntry, AuditMeta, AuditSink, DeliveryStatus};
use crate::core::routing::{RouteResult, RouteStatus};
use crate::error::{Error, Result};
use crate::protocol::envelope::A2AMessage;

/// Size at which a day's file rotates (50 MiB).
pub const DEFAULT_MAX_FILE_BYTES: u64 = 50 * 1024 * 1024;

/// Metadata for one audit write.
#[derive(Debug, Clone)]
pub struct LogOptions {
    /// Receive time; defaults to now
    pub now: Option<DateTime<Utc>>,
    pub delivery_status: DeliveryStatus,
    pub processing_time_ms: Option<u64>,
    /// Overrides the log's own `processed_by`
    pub processed_by: Option<String>,
    pub error: Option<String>,
}

impl LogOptions {
    pub fn new(delivery_status: DeliveryStatus) -> Self {
        Self {
            now: None,
            delivery_status,
            processing_time_ms: None,
            processed_by: None,
            error: None,
        }
    }

    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = Some(now);
        self
    }

    pub fn processing_time_ms(mut self, ms: u64) -> Self {
        self.processing_time_ms = Some(ms);
        self
    }

    pub fn processed_by(mut self, name: impl Into<String>) -> Self {
        self.processed_by = Some(name.into());
        self
    }

    pub fn error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Append-only audit log rooted at one directory.
#[derive(Debug)]
pub struct AuditLog {
    log_dir: PathBuf,
    processed_by: Option<String>,
    max_file_bytes: u64,
    write_lock: Mutex<()>,
}

impl AuditLog {
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            log_dir: log_dir.into(),
            processed_by: None,
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
            write_lock: Mutex::new(()),
        }
    }

    /// Name recorded as `processedBy` on every entry.
    pub fn with_processed_by(mut self, name: impl Into<String>) -> Self {
        self.processed_by = Some(name.into());
        self
    }

    pub fn with_max_file_bytes(mut self, bytes: u64) -> Self {
        self.max_file_bytes = bytes.max(1);
        self
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    /// Append one entry and return the file it was written to.
    pub async fn log(&self, message: &A2AMessage, options: LogOptions) -> Result<PathBuf> {
        let received_at = options.now.unwrap_or_else(Utc::now);
        let entry = AuditEntry {
            message: message.clone(),
            meta: AuditMeta {
                received_at,
                delivery_status: options.delivery_status,
                processing_time_ms: options.processing_time_ms,
                processed_by: options.processed_by.or_else(|| self.processed_by.clone()),
                error: options.error,
            },
        };
        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');

        // One writer at a time so rotation checks and appends stay consistent.
        let _guard = self.write_lock.lock().await;

        fs::create_dir_all(&self.log_dir).await.map_err(|e| {
            Error::Audit(format!(
                "Failed to create audit directory {}: {}",
                self.log_dir.display(),
                e
            ))
        })?;

        let path = self.current_file(received_at.date_naive()).await?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| Error::Audit(format!("Failed to open {}: {}", path.display(), e)))?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        tracing::debug!(
            "Audited {} ({}) to {}",
            message.message_id(),
            entry.meta.delivery_status,
            path.display()
        );
        Ok(path)
    }

    /// First file for `date` that is still below the size limit.
    async fn current_file(&self, date: NaiveDate) -> Result<PathBuf> {
        let mut index = 0;
        loop {
            let path = self.log_dir.join(log_file_name(date, index));
            match fs::metadata(&path).await {
                Ok(meta) if meta.len() >= self.max_file_bytes => index += 1,
                Ok(_) => return Ok(path),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(path),
                Err(e) => return Err(e.into()),
            }
        }
    }
}

#[async_trait]
impl AuditSink for AuditLog {
    async fn record(&self, message: &A2AMessage, outcome: &RouteResult) -> Result<()> {
        let status = match outcome.status {
            RouteStatus::Delivered => DeliveryStatus::Delivered,
            _ => DeliveryStatus::Failed,
        };
        let options = LogOptions {
            processing_time_ms: outcome.processing_time_ms,
            error: outcome.error.clone(),
            ..LogOptions::new(status)
        };
        self.log(message, options).await.map(|_| ())
    }
}

/// File name for a day's log, `index` 0 being the unrotated file.
pub fn log_file_name(date: NaiveDate, index: u32) -> String {
    if index == 0 {
        format!("a2a-{}.jsonl", date.format("%Y-%m-%d"))
    } else {
        format!("a2a-{}.{}.jsonl", date.format("%Y-%m-%d"), index)
    }
}

/// Date and rotation index of an audit file name.
pub fn parse_log_file_name(name: &str) -> Option<(NaiveDate, u32)> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    let re = PATTERN
        .get_or_init(|| Regex::new(r"^a2a-(\d{4}-\d{2}-\d{2})(?:\.(\d+))?\.jsonl$").ok())
        .as_ref()?;

    let caps = re.captures(name)?;
    let date = NaiveDate::parse_from_str(caps.get(1)?.as_str(), "%Y-%m-%d").ok()?;
    let index = match caps.get(2) {
        Some(m) => m.as_str().parse().ok()?,
        None => 0,
    };
    Some((date, index))
}

/// Read every entry of one audit file.
///
/// A missing or empty file yields no entries. Lines that fail to parse are
/// skipped with a warning.
pub async fn read_log_file(path: impl AsRef<Path>) -> Result<Vec<AuditEntry>> {
    let path = path.as_ref();
    let content = match fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut entries = Vec::new();
    for (number, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<AuditEntry>(line) {
            Ok(entry) => entries.push(entry),
            Err(e) => tracing::warn!(
                "Skipping malformed audit line {} in {}: {}",
                number + 1,
                path.display(),
                e
            ),
        }
    }
    Ok(entries)
}

/// Audit files in `log_dir`, oldest first.
///
/// Sorted by date, then rotation index. Other files are ignored and a
/// missing directory yields no files.
pub async fn list_log_files(log_dir: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let mut dir = match fs::read_dir(log_dir.as_ref()).await {
        Ok(dir) => dir,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut files = Vec::new();
    while let Some(entry) = dir.next_entry().await? {
        let name = entry.file_name();
        if let Some(key) = name.to_str().and_then(parse_log_file_name) {
            files.push((key, entry.path()));
        }
    }
    files.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(files.into_iter().map(|(_, path)| path).collect())
}
