//! Shared error type for code that only touches domain types and config —
//! the cloud and scheduler adapters have their own richer error enums that
//! convert into this one at their boundary with clustermgtd/resume/suspend.

use thiserror::Error;

/// Result type for `pcluster-core` operations.
pub type Result<T> = std::result::Result<T, PclusterError>;

#[derive(Error, Debug)]
pub enum PclusterError {
    #[error("malformed scheduler node name: {0}")]
    InvalidNodeName(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PclusterError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
