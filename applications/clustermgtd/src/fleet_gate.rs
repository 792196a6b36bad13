//! Fleet-status gating (§4.6 step 3): `Stopped`/`Started` are terminal;
//! `StopRequested`/`StartRequested` are transient states that drive the
//! instance population toward one of them over a few iterations.

use cloud_traits::{CloudApi, FleetStatusStore};
use pcluster_core::FleetStatus;
use pcluster_scheduler::SlurmScheduler;
use tracing::info;

use crate::error::Result;
use crate::snapshot::ReconciliationSnapshot;

/// What the caller should do with the rest of this iteration's act phase,
/// plus the fleet status as of the end of gating (unchanged from the
/// snapshot unless this call transitioned it).
pub enum GateOutcome {
    /// Gating handled everything this iteration needed; skip the health/
    /// capacity classifiers entirely.
    Handled(FleetStatus),
    /// Proceed to the normal classify-and-act pipeline.
    Continue(FleetStatus),
}

impl GateOutcome {
    pub fn status(&self) -> FleetStatus {
        match self {
            GateOutcome::Handled(s) | GateOutcome::Continue(s) => *s,
        }
    }
}

pub async fn apply(
    store: &dyn FleetStatusStore,
    cloud: &dyn CloudApi,
    scheduler: &SlurmScheduler,
    snapshot: &ReconciliationSnapshot,
) -> Result<GateOutcome> {
    match snapshot.fleet_status {
        FleetStatus::Stopped => {
            let live_ids: Vec<String> = snapshot
                .all_live_instances()
                .into_iter()
                .filter(|i| i.state.is_live())
                .map(|i| i.instance_id)
                .collect();
            if !live_ids.is_empty() {
                cloud.terminate(&live_ids).await?;
                info!(count = live_ids.len(), "fleet stopped: terminated remaining instances");
            }
            for (node, _) in &snapshot.bound {
                let _ = scheduler.power_down_force(node.name.as_str()).await;
            }
            for node in &snapshot.unbound_nodes {
                let _ = scheduler.power_down_force(node.name.as_str()).await;
            }
            Ok(GateOutcome::Handled(FleetStatus::Stopped))
        }
        FleetStatus::StopRequested => {
            store.set(FleetStatus::Stopping).await?;
            info!("fleet status StopRequested -> Stopping");
            Ok(GateOutcome::Handled(FleetStatus::Stopping))
        }
        FleetStatus::Stopping => {
            let live_ids: Vec<String> = snapshot
                .all_live_instances()
                .into_iter()
                .filter(|i| i.state.is_live())
                .map(|i| i.instance_id)
                .collect();
            if live_ids.is_empty() {
                store.set(FleetStatus::Stopped).await?;
                info!("fleet fully drained: Stopping -> Stopped");
                Ok(GateOutcome::Handled(FleetStatus::Stopped))
            } else {
                cloud.terminate(&live_ids).await?;
                info!(count = live_ids.len(), "fleet stopping: terminating instances");
                Ok(GateOutcome::Handled(FleetStatus::Stopping))
            }
        }
        FleetStatus::StartRequested => {
            store.set(FleetStatus::Starting).await?;
            info!("fleet status StartRequested -> Starting");
            Ok(GateOutcome::Continue(FleetStatus::Starting))
        }
        FleetStatus::Starting => {
            if !snapshot.bound.is_empty() || !snapshot.unbound_instances.is_empty() {
                store.set(FleetStatus::Started).await?;
                info!("instances observed: Starting -> Started");
                return Ok(GateOutcome::Continue(FleetStatus::Started));
            }
            Ok(GateOutcome::Continue(FleetStatus::Starting))
        }
        FleetStatus::Started | FleetStatus::Protected | FleetStatus::Unknown => {
            Ok(GateOutcome::Continue(snapshot.fleet_status))
        }
    }
}
