//! Route 53 DNS batching (§6 "DNS batch limit": at most 50 record-change
//! entries per `ChangeResourceRecordSets` call).
//!
//! Follows the same request-shape-then-retry style as `ec2.rs`, against the
//! Route 53 SDK client instead of EC2's.

use aws_sdk_route53::error::ProvideErrorMetadata;
use aws_sdk_route53::types::{
    Change, ChangeAction, ChangeBatch, RrType, ResourceRecord, ResourceRecordSet,
};
use aws_sdk_route53::Client;
use cloud_traits::{CloudError, DnsChange, Result};
use tracing::{debug, info};

use crate::retry::{is_transient_code, RetryPolicy};

/// Route 53 caps a single `ChangeResourceRecordSets` call at 1000 changes,
/// but we batch conservatively at 50 so a single slow/failing batch never
/// risks a large chunk of the cluster's DNS state (§6).
const BATCH_SIZE: usize = 50;

fn to_sdk_change(change: &DnsChange) -> Change {
    match change {
        DnsChange::Upsert { name, ip } => Change::builder()
            .action(ChangeAction::Upsert)
            .resource_record_set(
                ResourceRecordSet::builder()
                    .name(name)
                    .r#type(RrType::A)
                    .ttl(60)
                    .resource_records(ResourceRecord::builder().value(ip).build())
                    .build()
                    .expect("name/type/ttl are always set"),
            )
            .build()
            .expect("action/resource_record_set are always set"),
        DnsChange::Delete { name } => Change::builder()
            .action(ChangeAction::Delete)
            .resource_record_set(
                ResourceRecordSet::builder()
                    .name(name)
                    .r#type(RrType::A)
                    .ttl(60)
                    .build()
                    .expect("name/type/ttl are always set"),
            )
            .build()
            .expect("action/resource_record_set are always set"),
    }
}

pub async fn apply_dns_changes(
    client: &Client,
    policy: &RetryPolicy,
    zone_id: &str,
    changes: &[DnsChange],
) -> Result<()> {
    if changes.is_empty() {
        return Ok(());
    }

    for batch in changes.chunks(BATCH_SIZE) {
        let sdk_changes: Vec<Change> = batch.iter().map(to_sdk_change).collect();
        debug!(zone_id, batch_size = sdk_changes.len(), "submitting DNS change batch");

        let change_batch = ChangeBatch::builder()
            .set_changes(Some(sdk_changes))
            .build()
            .map_err(|e| CloudError::Config(e.to_string()))?;

        let zone_id = zone_id.to_string();
        policy
            .run("change_resource_record_sets", || {
                let change_batch = change_batch.clone();
                let zone_id = zone_id.clone();
                async move {
                    client
                        .change_resource_record_sets()
                        .hosted_zone_id(zone_id)
                        .change_batch(change_batch)
                        .send()
                        .await
                        .map(|_| ())
                        .map_err(|e| classify(e.into_service_error()))
                }
            })
            .await?;
    }

    info!(zone_id, change_count = changes.len(), "DNS changes applied");
    Ok(())
}

fn classify<E>(err: E) -> backoff::Error<CloudError>
where
    E: ProvideErrorMetadata + std::fmt::Display,
{
    let code = err.code().unwrap_or("Unknown").to_string();
    if code == "NoSuchHostedZone" {
        return backoff::Error::Permanent(CloudError::ZoneNotFound(err.to_string()));
    }
    if is_transient_code(&code) {
        return backoff::Error::transient(CloudError::Transient(err.to_string()));
    }
    backoff::Error::Permanent(CloudError::Rejected { code, message: err.to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batches_changes_at_fifty() {
        let changes: Vec<DnsChange> = (0..120)
            .map(|i| DnsChange::Upsert { name: format!("node-{i}"), ip: "10.0.0.1".into() })
            .collect();
        let batches: Vec<_> = changes.chunks(BATCH_SIZE).collect();
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].len(), 50);
        assert_eq!(batches[2].len(), 20);
    }
}
