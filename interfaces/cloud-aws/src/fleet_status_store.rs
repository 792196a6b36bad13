//! S3-backed `FleetStatusStore` (§9 "Global state lives in one place, not
//! scattered across ambient statics").
//!
//! A simple get/put-object round trip for a single small JSON value: no
//! versioning, no multipart upload, just enough to make the cluster-wide
//! fleet status durable across head-node restarts.

use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use cloud_traits::{CloudError, FleetStatusStore, Result};
use pcluster_core::FleetStatus;
use tokio::io::AsyncReadExt;
use tracing::{debug, warn};

pub struct S3FleetStatusStore {
    client: Client,
    bucket: String,
    key: String,
}

impl S3FleetStatusStore {
    pub fn new(client: Client, bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self { client, bucket: bucket.into(), key: key.into() }
    }
}

#[async_trait]
impl FleetStatusStore for S3FleetStatusStore {
    /// A missing object (first run, before anything has ever set a status)
    /// is not an error: it means `Unknown`, which `FleetStatus::allows_launch`
    /// already treats conservatively.
    async fn get(&self) -> Result<FleetStatus> {
        let output = match self.client.get_object().bucket(&self.bucket).key(&self.key).send().await
        {
            Ok(output) => output,
            Err(err) => {
                if is_not_found(&err) {
                    debug!(bucket = %self.bucket, key = %self.key, "no fleet status object yet, defaulting to Unknown");
                    return Ok(FleetStatus::Unknown);
                }
                return Err(CloudError::Transient(err.to_string()));
            }
        };

        let mut body = output.body.into_async_read();
        let mut buf = String::new();
        body.read_to_string(&mut buf)
            .await
            .map_err(|e| CloudError::Transient(e.to_string()))?;

        serde_json::from_str(&buf).map_err(|err| {
            warn!(error = %err, "fleet status object is malformed, defaulting to Unknown");
            CloudError::Config(err.to_string())
        })
    }

    async fn set(&self, status: FleetStatus) -> Result<()> {
        let body = serde_json::to_vec(&status).map_err(|e| CloudError::Config(e.to_string()))?;
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&self.key)
            .body(ByteStream::from(body))
            .content_type("application/json")
            .send()
            .await
            .map_err(|e| CloudError::Transient(e.to_string()))?;
        debug!(bucket = %self.bucket, key = %self.key, status = ?status, "fleet status persisted");
        Ok(())
    }
}

fn is_not_found(err: &aws_sdk_s3::error::SdkError<aws_sdk_s3::operation::get_object::GetObjectError>) -> bool {
    matches!(
        err,
        aws_sdk_s3::error::SdkError::ServiceError(service_err)
            if service_err.err().is_no_such_key()
    )
}
