//! Builds one `ReconciliationSnapshot` per iteration (§4.6 steps 1-2):
//! concurrently fetch scheduler nodes, cluster instances, fleet status,
//! capacity-reservation state and scheduled events, then bind nodes to
//! instances by nodeaddr <-> private IP.
//!
//! Structured as a one-shot fetch-and-bind called once per reconciliation
//! iteration rather than a free-running background refresh task, since
//! clustermgtd needs a single consistent snapshot to reason about.

use std::collections::HashMap;

use cloud_traits::{CapacityReservationState, CloudApi, DescribeFilter, FleetStatusStore, ScheduledEvent};
use pcluster_core::{
    FleetStatus, Instance, Node, NODE_TYPE_COMPUTE, TAG_CLUSTER_NAME, TAG_NODE_TYPE,
};
use pcluster_scheduler::SlurmScheduler;

use crate::error::Result;

pub struct ReconciliationSnapshot {
    pub fleet_status: FleetStatus,
    pub capacity_reservations: Vec<CapacityReservationState>,
    pub scheduled_events: Vec<ScheduledEvent>,
    /// Nodes bound to a live-looking instance by nodeaddr <-> private IP.
    pub bound: Vec<(Node, Instance)>,
    /// Nodes the scheduler reports with no matching instance (steady, or
    /// awaiting a launch already in flight).
    pub unbound_nodes: Vec<Node>,
    /// Instances with no node claiming them by nodeaddr — orphan candidates.
    pub unbound_instances: Vec<Instance>,
}

impl ReconciliationSnapshot {
    pub async fn fetch(
        cloud: &dyn CloudApi,
        scheduler: &SlurmScheduler,
        fleet_status_store: &dyn FleetStatusStore,
        cluster_name: &str,
        capacity_reservation_ids: &[String],
    ) -> Result<Self> {
        let filters = vec![
            DescribeFilter::tag(TAG_CLUSTER_NAME, cluster_name),
            DescribeFilter::tag(TAG_NODE_TYPE, NODE_TYPE_COMPUTE),
        ];

        let (nodes, instances, fleet_status) = tokio::try_join!(
            async { scheduler.list_nodes().await.map_err(crate::error::ClustermgtdError::from) },
            async {
                cloud
                    .describe_instances_by_filter(&filters)
                    .await
                    .map_err(crate::error::ClustermgtdError::from)
            },
            async { fleet_status_store.get().await.map_err(crate::error::ClustermgtdError::from) },
        )?;

        let instance_ids: Vec<String> = instances.iter().map(|i| i.instance_id.clone()).collect();

        let (capacity_reservations, scheduled_events) = tokio::try_join!(
            async {
                cloud
                    .describe_capacity_reservations(capacity_reservation_ids)
                    .await
                    .map_err(crate::error::ClustermgtdError::from)
            },
            async {
                cloud
                    .describe_scheduled_events(&instance_ids)
                    .await
                    .map_err(crate::error::ClustermgtdError::from)
            },
        )?;

        let (bound, unbound_nodes, unbound_instances) = bind(nodes, instances);

        Ok(Self {
            fleet_status,
            capacity_reservations,
            scheduled_events,
            bound,
            unbound_nodes,
            unbound_instances,
        })
    }

    pub fn known_node_names(&self) -> std::collections::HashSet<String> {
        self.bound
            .iter()
            .map(|(n, _)| n.name.as_str().to_string())
            .chain(self.unbound_nodes.iter().map(|n| n.name.as_str().to_string()))
            .collect()
    }

    pub fn all_live_instances(&self) -> Vec<Instance> {
        self.bound
            .iter()
            .map(|(_, i)| i.clone())
            .chain(self.unbound_instances.iter().cloned())
            .collect()
    }
}

fn bind(nodes: Vec<Node>, instances: Vec<Instance>) -> (Vec<(Node, Instance)>, Vec<Node>, Vec<Instance>) {
    let mut instances_by_ip: HashMap<String, Instance> = instances
        .into_iter()
        .filter_map(|i| i.private_ip.clone().map(|ip| (ip, i)))
        .collect();

    let mut bound = Vec::new();
    let mut unbound_nodes = Vec::new();

    for node in nodes {
        if node.is_assigned() {
            let addr = node.node_addr.clone().unwrap();
            if let Some(instance) = instances_by_ip.remove(&addr) {
                bound.push((node, instance));
                continue;
            }
        }
        unbound_nodes.push(node);
    }

    let unbound_instances: Vec<Instance> = instances_by_ip.into_values().collect();
    (bound, unbound_nodes, unbound_instances)
}
