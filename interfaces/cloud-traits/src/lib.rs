//! `CloudApi` — the narrow, strongly-typed surface over the cloud provider
//! that `resume`, `suspend` and `clustermgtd` work through (§4.1).
//!
//! Nothing above this trait knows it's talking to AWS. `cloud-aws` is the
//! only crate that imports an AWS SDK; everything else programs against
//! `CloudApi` the same way the rest of this codebase's provider trait
//! lets the fleet logic work through an interface only, never a concrete
//! implementation.

pub mod error;
pub mod requests;

pub use error::{CapacityErrorKind, CloudError, Result};
pub use requests::{
    CapacityError, CapacityReservationState, DescribeFilter, DnsChange, FleetOverrides,
    LaunchFleetOutcome, LaunchFleetRequest, ScheduledEvent,
};

use async_trait::async_trait;
use pcluster_core::Instance;

/// Every cloud provider this workspace supports implements this trait.
/// `resume`, `suspend` and `clustermgtd` depend on it, never on a concrete
/// provider crate.
#[async_trait]
pub trait CloudApi: Send + Sync {
    /// Batched fleet launch per (queue, compute-resource). Never partially
    /// retries inside this call — callers get back whatever subset of
    /// `count` the provider could satisfy plus a typed error per shortfall
    /// (§4.3 step 5, §8 "partial instances list").
    async fn launch_fleet(&self, request: LaunchFleetRequest) -> Result<LaunchFleetOutcome>;

    /// Idempotent batched termination; already-terminated ids are treated
    /// as success (§4.1).
    async fn terminate(&self, instance_ids: &[String]) -> Result<()>;

    /// Tags a single instance, most importantly with the `Name` tag
    /// carrying the node name it is bound to (§4.3 step 4, §8 Scenario 1
    /// "three tag writes"). `health_policy::orphan` reads this tag back via
    /// `Instance::node_name_tag` to decide whether a live instance still
    /// has an owning node.
    async fn tag_instance(&self, instance_id: &str, tags: &std::collections::HashMap<String, String>) -> Result<()>;

    /// Consumes every page before returning — a pagination truncation must
    /// never produce a partial snapshot (§8 "Boundary behaviors").
    async fn describe_instances_by_filter(
        &self,
        filters: &[DescribeFilter],
    ) -> Result<Vec<Instance>>;

    async fn describe_capacity_reservations(
        &self,
        ids: &[String],
    ) -> Result<Vec<CapacityReservationState>>;

    /// Scheduled maintenance events (reboot, retirement, ...) targeting
    /// instances in the cluster, used by the unhealthy classifier (§4.5).
    async fn describe_scheduled_events(&self, instance_ids: &[String]) -> Result<Vec<ScheduledEvent>>;

    /// Applies `changes` in batches of at most 50 record-change-set
    /// entries per call (§6 "DNS batch limit").
    async fn apply_dns_changes(&self, zone_id: &str, changes: &[DnsChange]) -> Result<()>;
}

/// The fleet-status value lives in durable object storage; this is the
/// typed handle threaded through every component that needs it instead of
/// an ambient singleton (§9 "Global state").
#[async_trait]
pub trait FleetStatusStore: Send + Sync {
    async fn get(&self) -> Result<pcluster_core::FleetStatus>;
    async fn set(&self, status: pcluster_core::FleetStatus) -> Result<()>;
}
