//! Error types for the suspend program (§4.4, §7).

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SuspendError>;

#[derive(Error, Debug)]
pub enum SuspendError {
    #[error("scheduler error: {0}")]
    Scheduler(#[from] pcluster_scheduler::SchedulerError),

    #[error(transparent)]
    Core(#[from] pcluster_core::PclusterError),
}
