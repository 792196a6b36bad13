//! Error types for computemgtd (§4.7, §7).

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ComputeMgtdError>;

#[derive(Error, Debug)]
pub enum ComputeMgtdError {
    #[error("cloud provider error: {0}")]
    Cloud(#[from] cloud_traits::CloudError),

    #[error(transparent)]
    Core(#[from] pcluster_core::PclusterError),

    #[error("IMDS error: {0}")]
    Imds(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
