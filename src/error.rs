//! Error types for a2a-relay.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Audit error: {0}")]
    Audit(String),

    #[error("Delivery error: {0}")]
    Delivery(String),

    #[error("SDK error: {0}")]
    Sdk(#[from] SdkError),

    #[error("Not found: {0}")]
    NotFound(String),
}

/// Misuse of the agent SDK context.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SdkError {
    #[error("SDK not initialized; call init() with an agent identity first")]
    NotInitialized,

    #[error("SDK already initialized for agent '{0}'; call reset() before switching identity")]
    AlreadyInitialized(String),

    #[error("No send function configured; call set_send_function() first")]
    NoSendFunction,
}
