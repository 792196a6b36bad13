//! Error taxonomy for the scheduler adapter (§4.2, §7).

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SchedulerError>;

#[derive(Error, Debug)]
pub enum SchedulerError {
    /// A `scontrol`/`sinfo` invocation failed after the retry budget was
    /// exhausted. clustermgtd treats this as a health-counter event, not an
    /// immediate crash (§4.2, §4.6).
    #[error("scheduler command failed after retries: {0}")]
    Fatal(String),

    #[error("failed to parse scheduler output: {0}")]
    ParseError(String),

    #[error("io error invoking scheduler command: {0}")]
    Io(#[from] std::io::Error),
}
