//! The single `ActionDispatcher` that turns `health_policy::Action` values
//! into `CloudApi`/scheduler calls (§4.5, §9). Classifiers never touch the
//! network; this is the only place in the crate that does, which is what
//! lets `health-policy` be tested with no cloud involved.

use std::collections::HashSet;

use cloud_traits::{CloudApi, DnsChange};
use health_policy::Action;
use pcluster_scheduler::SlurmScheduler;
use tracing::{info, warn};

use crate::error::Result;

#[derive(Debug, Default)]
pub struct DispatchSummary {
    pub terminated: usize,
    pub marked_down: usize,
    pub reset: usize,
    pub drained: usize,
    pub powered_up: usize,
    pub dns_upserts: usize,
    pub dns_deletes: usize,
}

/// Applies a batch of actions. Terminations and DNS changes are
/// deduplicated and sent as single batched calls; scheduler updates are
/// inherently per-node and sent individually (§4.2 has no batch update API).
pub async fn dispatch(
    cloud: &dyn CloudApi,
    scheduler: &SlurmScheduler,
    dns_zone_id: Option<&str>,
    actions: Vec<Action>,
) -> Result<DispatchSummary> {
    let mut summary = DispatchSummary::default();
    let mut terminate_ids: HashSet<String> = HashSet::new();
    let mut dns_changes = Vec::new();

    for action in actions {
        match action {
            Action::Noop => {}
            Action::Terminate { instance_id } => {
                terminate_ids.insert(instance_id);
            }
            Action::MarkDown { node_name, reason } => {
                if let Err(err) = scheduler.mark_down(&node_name, &reason).await {
                    warn!(node = %node_name, error = %err, "failed to mark node down");
                } else {
                    summary.marked_down += 1;
                }
            }
            Action::Reset { node_name } => {
                if let Err(err) = scheduler.power_down_force(&node_name).await {
                    warn!(node = %node_name, error = %err, "failed to power-down-force node for reset");
                    continue;
                }
                if let Err(err) = scheduler.power_up(&node_name).await {
                    warn!(node = %node_name, error = %err, "failed to power-up node after reset");
                    continue;
                }
                summary.reset += 1;
            }
            Action::Drain { node_name, reason } => {
                if let Err(err) = scheduler.drain(&node_name, &reason).await {
                    warn!(node = %node_name, error = %err, "failed to drain node");
                } else {
                    summary.drained += 1;
                }
            }
            Action::PowerUp { node_name } => {
                if let Err(err) = scheduler.power_up(&node_name).await {
                    warn!(node = %node_name, error = %err, "failed to power-up node");
                } else {
                    summary.powered_up += 1;
                }
            }
            Action::UpsertDns { name, ip } => {
                summary.dns_upserts += 1;
                dns_changes.push(DnsChange::Upsert { name, ip });
            }
            Action::DeleteDns { name } => {
                summary.dns_deletes += 1;
                dns_changes.push(DnsChange::Delete { name });
            }
        }
    }

    if !terminate_ids.is_empty() {
        let ids: Vec<String> = terminate_ids.into_iter().collect();
        summary.terminated = ids.len();
        cloud.terminate(&ids).await?;
        info!(count = summary.terminated, "terminated instances");
    }

    if !dns_changes.is_empty() {
        if let Some(zone_id) = dns_zone_id {
            cloud.apply_dns_changes(zone_id, &dns_changes).await?;
        } else {
            warn!(count = dns_changes.len(), "dropping DNS changes: no hosted zone configured");
        }
    }

    Ok(summary)
}
