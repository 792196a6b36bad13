//! Error types for the resume program (§4.3, §7).

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ResumeError>;

#[derive(Error, Debug)]
pub enum ResumeError {
    #[error("cloud provider error: {0}")]
    Cloud(#[from] cloud_traits::CloudError),

    #[error("scheduler error: {0}")]
    Scheduler(#[from] pcluster_scheduler::SchedulerError),

    #[error(transparent)]
    Core(#[from] pcluster_core::PclusterError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
