//! Error types for the reconciliation daemon (§7).

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClustermgtdError>;

#[derive(Error, Debug)]
pub enum ClustermgtdError {
    #[error("cloud provider error: {0}")]
    Cloud(#[from] cloud_traits::CloudError),

    #[error("scheduler error: {0}")]
    Scheduler(#[from] pcluster_scheduler::SchedulerError),

    #[error(transparent)]
    Core(#[from] pcluster_core::PclusterError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
