//! Error taxonomy for the `CloudApi` boundary (§7).

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CloudError>;

/// Distinguishes ICE from the rest of the permanent/validation error space
/// so `resume` can apply the cooldown-and-defer policy (§4.3 step 5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapacityErrorKind {
    InsufficientCapacity,
    Other,
}

#[derive(Error, Debug)]
pub enum CloudError {
    /// Retried internally by the adapter until the deadline; only reaches
    /// callers if the deadline elapsed (§4.1, §7).
    #[error("transient provider error after retry budget exhausted: {0}")]
    Transient(String),

    /// Permanent/validation error — no retry, surfaced verbatim (§7).
    #[error("provider rejected request ({code}): {message}")]
    Rejected { code: String, message: String },

    #[error("insufficient instance capacity: {0}")]
    InsufficientCapacity(String),

    #[error("DNS zone not found: {0}")]
    ZoneNotFound(String),

    #[error("config error: {0}")]
    Config(String),
}

impl CloudError {
    pub fn is_capacity(&self) -> bool {
        matches!(self, Self::InsufficientCapacity(_))
    }
}
