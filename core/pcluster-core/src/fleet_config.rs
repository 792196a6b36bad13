//! The fleet config file (§6): `queue → compute-resource → {api,
//! capacity_type, instances, ...}`, shared between `resume`, `suspend` and
//! `clustermgtd`.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{PclusterError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Api {
    RunInstances,
    CreateFleet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CapacityType {
    OnDemand,
    Spot,
    CapacityBlock,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceTypeConfig {
    pub instance_type: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Networking {
    #[serde(default)]
    pub subnet_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputeResourceConfig {
    pub api: Api,
    pub capacity_type: CapacityType,
    #[serde(default)]
    pub capacity_reservation_id: Option<String>,
    pub instances: Vec<InstanceTypeConfig>,
    #[serde(default)]
    pub allocation_strategy: Option<String>,
    #[serde(default)]
    pub networking: Networking,
}

/// `queue -> compute_resource -> config`, deserialized directly from
/// `fleet-config.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FleetConfig {
    #[serde(flatten)]
    pub queues: HashMap<String, HashMap<String, ComputeResourceConfig>>,
}

impl FleetConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        serde_json::from_str(&data).map_err(Into::into)
    }

    pub fn lookup(&self, queue: &str, compute_resource: &str) -> Option<&ComputeResourceConfig> {
        self.queues.get(queue)?.get(compute_resource)
    }

    /// Used by resume to fail a single group, not the whole invocation,
    /// when the fleet config has no entry for it (§4.3 step 2).
    pub fn require(&self, queue: &str, compute_resource: &str) -> Result<&ComputeResourceConfig> {
        self.lookup(queue, compute_resource).ok_or_else(|| {
            PclusterError::config(format!(
                "no fleet-config entry for queue={queue} compute_resource={compute_resource}"
            ))
        })
    }

    /// Every `capacity_reservation_id` configured on a `capacity-block`
    /// compute resource, used by clustermgtd to poll reservation lifecycle
    /// (§4.5 capacity-block classifier).
    pub fn capacity_block_reservation_ids(&self) -> Vec<String> {
        self.queues
            .values()
            .flat_map(|crs| crs.values())
            .filter(|cr| cr.capacity_type == CapacityType::CapacityBlock)
            .filter_map(|cr| cr.capacity_reservation_id.clone())
            .collect()
    }

    /// Reverse lookup from a reservation id back to the (queue,
    /// compute-resource) it's configured on, so clustermgtd can find which
    /// nodes a capacity-block transition applies to (§4.5, §4.6 step 5).
    pub fn queue_and_cr_for_reservation(&self, reservation_id: &str) -> Option<(&str, &str)> {
        for (queue, crs) in &self.queues {
            for (cr_name, cr) in crs {
                if cr.capacity_reservation_id.as_deref() == Some(reservation_id) {
                    return Some((queue.as_str(), cr_name.as_str()));
                }
            }
        }
        None
    }
}
