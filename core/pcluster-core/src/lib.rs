//! Shared domain types, error taxonomy and configuration for the
//! node-lifecycle daemons: `clustermgtd`, `resume`, `suspend` and
//! `computemgtd`.
//!
//! Everything here is inert data and pure helpers — no cloud calls, no
//! scheduler calls, no I/O beyond config loading. The daemons wire this
//! together with `cloud-traits`, `cloud-aws`, `pcluster-scheduler` and
//! `health-policy`.

pub mod config;
pub mod error;
pub mod fleet_config;
pub mod fleet_status;
pub mod logging;
pub mod types;

pub use config::Config;
pub use error::{PclusterError, Result};
pub use fleet_config::{Api, CapacityType, ComputeResourceConfig, FleetConfig};
pub use fleet_status::{FleetStatus, FleetStatusCache};
pub use types::{
    Instance, InstanceState, Node, NodeName, NodeStateFlags, NodeType, NODE_TYPE_COMPUTE,
    NODE_TYPE_HEAD, TAG_CLUSTER_NAME, TAG_COMPUTE_RESOURCE_NAME, TAG_NODE_NAME, TAG_NODE_TYPE,
    TAG_QUEUE_NAME, UNASSIGNED_ADDR,
};
