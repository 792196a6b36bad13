//! IMDSv2 client: self instance-id and scheduled-maintenance events for the
//! local instance (§4.7).

use std::time::Duration;

use tracing::debug;

use crate::error::{ComputeMgtdError, Result};

const METADATA_BASE: &str = "http://169.254.169.254";
const TOKEN_ENDPOINT: &str = "/latest/api/token";
const INSTANCE_ID_ENDPOINT: &str = "/latest/meta-data/instance-id";
const TOKEN_TTL_HEADER: &str = "X-aws-ec2-metadata-token-ttl-seconds";
const TOKEN_HEADER: &str = "X-aws-ec2-metadata-token";

/// Minimal IMDSv2 client: fetch a session token, then use it for every
/// metadata read. Every call here is expected to succeed on a real EC2
/// instance — a failure is surfaced, not swallowed, since computemgtd
/// cannot decide anything without knowing its own instance id.
pub struct ImdsClient {
    client: reqwest::Client,
}

impl ImdsClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(2))
                .build()
                .expect("reqwest client builds with default TLS backend"),
        }
    }

    async fn token(&self) -> Result<String> {
        let resp = self
            .client
            .put(format!("{METADATA_BASE}{TOKEN_ENDPOINT}"))
            .header(TOKEN_TTL_HEADER, "21600")
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(ComputeMgtdError::Imds(format!(
                "token request failed: {}",
                resp.status()
            )));
        }
        Ok(resp.text().await?)
    }

    /// Self instance-id, used to self-terminate and to filter scheduled
    /// events down to "does this apply to me" (§4.7).
    pub async fn instance_id(&self) -> Result<String> {
        let token = self.token().await?;
        let resp = self
            .client
            .get(format!("{METADATA_BASE}{INSTANCE_ID_ENDPOINT}"))
            .header(TOKEN_HEADER, token)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(ComputeMgtdError::Imds(format!(
                "instance-id request failed: {}",
                resp.status()
            )));
        }
        let id = resp.text().await?;
        debug!(instance_id = %id, "resolved local instance id via IMDS");
        Ok(id)
    }
}

impl Default for ImdsClient {
    fn default() -> Self {
        Self::new()
    }
}
