//! Request/response/event types for `CloudApi`.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use pcluster_core::{Api, CapacityType, Instance};
use serde::{Deserialize, Serialize};

/// One batched launch call for a single (queue, compute-resource) group.
#[derive(Debug, Clone)]
pub struct LaunchFleetRequest {
    pub cluster_name: String,
    pub queue: String,
    pub compute_resource: String,
    pub api: Api,
    pub capacity_type: CapacityType,
    pub instance_types: Vec<String>,
    pub capacity_reservation_id: Option<String>,
    pub allocation_strategy: Option<String>,
    pub subnet_ids: Vec<String>,
    pub count: u32,
    /// Shallow-merged contents of the matching override file (§4.1
    /// "Overrides").
    pub overrides: FleetOverrides,
}

/// Extra request fields shallow-merged from `run_instances_overrides.json`
/// / `create_fleet_overrides.json` (§6).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FleetOverrides {
    #[serde(flatten)]
    pub fields: HashMap<String, serde_json::Value>,
}

impl FleetOverrides {
    pub fn merge_into(&self, base: &mut serde_json::Map<String, serde_json::Value>) {
        for (k, v) in &self.fields {
            base.insert(k.clone(), v.clone());
        }
    }
}

/// The distinguished ICE (insufficient-instance-capacity) family of errors,
/// separated from other per-instance launch failures so callers can apply
/// the fast-failover cooldown policy (§4.3 step 5, §7).
#[derive(Debug, Clone)]
pub struct CapacityError {
    pub compute_resource: String,
    pub kind: crate::error::CapacityErrorKind,
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct LaunchFleetOutcome {
    pub assigned: Vec<Instance>,
    pub errors: Vec<CapacityError>,
}

impl LaunchFleetOutcome {
    pub fn is_fully_satisfied(&self, requested: u32) -> bool {
        self.assigned.len() as u32 >= requested
    }
}

#[derive(Debug, Clone)]
pub struct DescribeFilter {
    pub name: String,
    pub values: Vec<String>,
}

impl DescribeFilter {
    pub fn tag(key: &str, value: impl Into<String>) -> Self {
        Self {
            name: format!("tag:{key}"),
            values: vec![value.into()],
        }
    }

    pub fn instance_state_name(states: &[&str]) -> Self {
        Self {
            name: "instance-state-name".to_string(),
            values: states.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapacityReservationLifecycle {
    Pending,
    Active,
    Expired,
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct CapacityReservationState {
    pub reservation_id: String,
    pub lifecycle: CapacityReservationLifecycle,
}

#[derive(Debug, Clone)]
pub struct ScheduledEvent {
    pub instance_id: String,
    pub code: String,
    pub not_before: DateTime<Utc>,
}

/// A single DNS upsert or delete, batched at 50 per `apply_dns_changes`
/// call (§6).
#[derive(Debug, Clone)]
pub enum DnsChange {
    Upsert { name: String, ip: String },
    Delete { name: String },
}
