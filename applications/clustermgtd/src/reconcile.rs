//! One reconciliation iteration (§4.6). Single-threaded: fetch a snapshot,
//! gate on fleet status, classify bound node/instance pairs and orphans,
//! dispatch the resulting actions, persist the heartbeat.

use std::collections::HashSet;

use chrono::Utc;
use cloud_traits::{CloudApi, FleetStatusStore};
use health_policy::{capacity_block_actions, classify_capacity_block, evaluate_bound_pair, orphan, Action};
use pcluster_core::{Config, FleetConfig};
use pcluster_scheduler::SlurmScheduler;
use tracing::{info, warn};

use crate::dispatch::{dispatch, DispatchSummary};
use crate::error::Result;
use crate::fleet_gate::{self, GateOutcome};
use crate::protected::ProtectedModeCounter;
use crate::snapshot::ReconciliationSnapshot;

pub struct Reconciler<'a> {
    pub cloud: &'a dyn CloudApi,
    pub scheduler: &'a SlurmScheduler,
    pub fleet_status_store: &'a dyn FleetStatusStore,
    pub config: &'a Config,
    pub fleet_config: &'a FleetConfig,
    pub dns_zone_id: Option<&'a str>,
    pub protected_counter: ProtectedModeCounter,
}

#[derive(Debug, Default)]
pub struct IterationReport {
    pub dispatch_summary: DispatchSummary,
    pub protected_tripped: bool,
    pub fleet_status: Option<pcluster_core::FleetStatus>,
}

impl<'a> Reconciler<'a> {
    /// Runs one full iteration (§4.6, steps 1-6).
    pub async fn run_iteration(&mut self) -> Result<IterationReport> {
        let now = Utc::now();
        let reservation_ids = self.fleet_config.capacity_block_reservation_ids();

        let snapshot = ReconciliationSnapshot::fetch(
            self.cloud,
            self.scheduler,
            self.fleet_status_store,
            &self.config.cluster_name,
            &reservation_ids,
        )
        .await?;

        let gate_outcome =
            fleet_gate::apply(self.fleet_status_store, self.cloud, self.scheduler, &snapshot).await?;
        let gated_status = gate_outcome.status();
        if let GateOutcome::Handled(status) = gate_outcome {
            return Ok(IterationReport { fleet_status: Some(status), ..Default::default() });
        }

        if !snapshot.fleet_status.allows_launch() && snapshot.fleet_status != pcluster_core::FleetStatus::Starting
        {
            info!(status = ?snapshot.fleet_status, "fleet status does not allow launches this iteration");
        }

        let mut actions = Vec::new();
        let mut dynamic_bootstrap_failures = 0usize;

        let event_grace = to_chrono_duration(self.config.tag_propagation_grace());
        let bootstrap_timeout = to_chrono_duration(self.config.bootstrap_timeout());
        let orphan_grace = std::cmp::max(
            to_chrono_duration(self.config.orphan_grace_period()),
            event_grace,
        );

        for (node, instance) in &snapshot.bound {
            let action = evaluate_bound_pair(
                node,
                instance,
                &snapshot.scheduled_events,
                &self.config.unhealthy_reason_patterns,
                now,
                event_grace,
                bootstrap_timeout,
            );
            if matches!(action, Action::MarkDown { .. }) && node.is_dynamic() {
                dynamic_bootstrap_failures += 1;
            }
            actions.push(action);
        }

        let known_names: HashSet<String> = snapshot.known_node_names();
        for instance in &snapshot.unbound_instances {
            if orphan(instance, &known_names, now, orphan_grace) {
                actions.push(Action::Terminate { instance_id: instance.instance_id.clone() });
                if let Some(name) = instance.node_name_tag() {
                    actions.push(Action::DeleteDns { name: name.to_string() });
                }
            }
        }

        let all_nodes: Vec<&pcluster_core::Node> =
            snapshot.bound.iter().map(|(n, _)| n).chain(snapshot.unbound_nodes.iter()).collect();

        for cr in &snapshot.capacity_reservations {
            let Some((queue, compute_resource)) =
                self.fleet_config.queue_and_cr_for_reservation(&cr.reservation_id)
            else {
                warn!(reservation_id = %cr.reservation_id, "capacity reservation has no matching fleet-config entry");
                continue;
            };

            let cr_nodes: Vec<&pcluster_core::Node> = all_nodes
                .iter()
                .copied()
                .filter(|n| n.name.queue == queue && n.name.compute_resource == compute_resource)
                .collect();

            let cr_action = classify_capacity_block(cr.lifecycle);
            let node_actions = capacity_block_actions(cr_action, &cr_nodes);
            if !node_actions.is_empty() {
                info!(
                    reservation_id = %cr.reservation_id,
                    queue,
                    compute_resource,
                    action = ?cr_action,
                    count = node_actions.len(),
                    "applying capacity-block transition"
                );
            }
            actions.extend(node_actions);
        }

        let protected_tripped = self
            .protected_counter
            .record(dynamic_bootstrap_failures, self.config.protected_failure_count);
        let final_status = if protected_tripped && gated_status != pcluster_core::FleetStatus::Protected {
            self.fleet_status_store.set(pcluster_core::FleetStatus::Protected).await?;
            warn!("repeated bootstrap failures: fleet status -> Protected");
            pcluster_core::FleetStatus::Protected
        } else {
            gated_status
        };

        let dispatch_summary = dispatch(self.cloud, self.scheduler, self.dns_zone_id, actions).await?;

        Ok(IterationReport { dispatch_summary, protected_tripped, fleet_status: Some(final_status) })
    }
}

fn to_chrono_duration(d: std::time::Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or_else(|_| chrono::Duration::zero())
}
