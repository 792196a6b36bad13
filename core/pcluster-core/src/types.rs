//! Node and instance domain types shared across every daemon in this
//! workspace.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{PclusterError, Result};

/// Whether a node's backing instance is launched eagerly and kept running
/// (`Static`) or only while the scheduler has powered the node up
/// (`Dynamic`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeType {
    Static,
    Dynamic,
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static => write!(f, "st"),
            Self::Dynamic => write!(f, "dy"),
        }
    }
}

/// A parsed `{queue}-{type}-{compute-resource}-{index}` scheduler node name.
///
/// Slurm hands us these as flat strings; everything downstream wants the
/// queue and compute-resource components to look up fleet config, so we
/// parse once at the boundary rather than re-splitting strings everywhere.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeName {
    pub queue: String,
    pub node_type: NodeType,
    pub compute_resource: String,
    pub index: u32,
    raw: String,
}

impl NodeName {
    pub fn parse(raw: &str) -> Result<Self> {
        let parts: Vec<&str> = raw.rsplitn(4, '-').collect();
        if parts.len() != 4 {
            return Err(PclusterError::InvalidNodeName(raw.to_string()));
        }
        // rsplitn yields parts in reverse order: [index, compute_resource, type, queue]
        let index: u32 = parts[0]
            .parse()
            .map_err(|_| PclusterError::InvalidNodeName(raw.to_string()))?;
        let node_type = match parts[2] {
            "st" => NodeType::Static,
            "dy" => NodeType::Dynamic,
            _ => return Err(PclusterError::InvalidNodeName(raw.to_string())),
        };
        Ok(Self {
            queue: parts[3].to_string(),
            node_type,
            compute_resource: parts[1].to_string(),
            index,
            raw: raw.to_string(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for NodeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

/// Scheduler-reported state flags for a single node. Several can be set at
/// once (e.g. `power_down` and `drain`); `unhealthy`/`orphan` classification
/// reads combinations of these, not a single discriminant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeStateFlags {
    pub power_saving: bool,
    pub powering_up: bool,
    pub powered_down: bool,
    pub drain: bool,
    pub down: bool,
    pub idle: bool,
    pub alloc: bool,
    pub mix: bool,
    pub completing: bool,
}

impl NodeStateFlags {
    /// True for the states `bootstrap_failed` and `unhealthy` treat as
    /// "actively doing scheduler work" — a node in one of these should
    /// never be reclassified as a bootstrap failure even if its instance
    /// is old.
    pub fn is_active(&self) -> bool {
        self.idle || self.alloc || self.mix || self.completing
    }
}

/// A node record as reported by the scheduler adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub name: NodeName,
    pub state: NodeStateFlags,
    pub reason: Option<String>,
    pub last_busy: Option<DateTime<Utc>>,
    pub node_addr: Option<String>,
    pub node_hostname: Option<String>,
    pub reservation: Option<String>,
}

/// Placeholder nodeaddr/hostname the scheduler reports for a node that has
/// never been bound to an instance.
pub const UNASSIGNED_ADDR: &str = "NodeAddr";

impl Node {
    /// A node is assigned iff it carries a non-placeholder nodeaddr (§3).
    pub fn is_assigned(&self) -> bool {
        match &self.node_addr {
            Some(addr) => !addr.is_empty() && addr != UNASSIGNED_ADDR,
            None => false,
        }
    }

    pub fn queue(&self) -> &str {
        &self.name.queue
    }

    pub fn compute_resource(&self) -> &str {
        &self.name.compute_resource
    }

    pub fn is_static(&self) -> bool {
        self.name.node_type == NodeType::Static
    }

    pub fn is_dynamic(&self) -> bool {
        self.name.node_type == NodeType::Dynamic
    }
}

/// Cloud-reported instance lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstanceState {
    Pending,
    Running,
    ShuttingDown,
    Terminated,
    Stopping,
    Stopped,
}

impl InstanceState {
    pub fn is_live(&self) -> bool {
        !matches!(self, Self::Terminated | Self::ShuttingDown)
    }

    pub fn from_ec2_state_name(name: &str) -> Self {
        match name {
            "pending" => Self::Pending,
            "running" => Self::Running,
            "shutting-down" => Self::ShuttingDown,
            "terminated" => Self::Terminated,
            "stopping" => Self::Stopping,
            "stopped" => Self::Stopped,
            _ => Self::Terminated,
        }
    }
}

/// Required tag keys on every launched instance (§6).
pub const TAG_CLUSTER_NAME: &str = "parallelcluster:cluster-name";
pub const TAG_NODE_TYPE: &str = "parallelcluster:node-type";
pub const TAG_QUEUE_NAME: &str = "parallelcluster:queue-name";
pub const TAG_COMPUTE_RESOURCE_NAME: &str = "parallelcluster:compute-resource-name";
/// The tag `orphan` keys off to recover the node name a launched instance
/// was bound to (§4.3 step 4, §8 "orphan").
pub const TAG_NODE_NAME: &str = "Name";

/// The value of `parallelcluster:node-type` for head vs. compute instances.
pub const NODE_TYPE_HEAD: &str = "HeadNode";
pub const NODE_TYPE_COMPUTE: &str = "Compute";

/// A cloud instance as returned by the CloudApi adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instance {
    pub instance_id: String,
    pub private_ip: Option<String>,
    pub private_dns: Option<String>,
    pub instance_type: String,
    pub launch_time: DateTime<Utc>,
    pub state: InstanceState,
    pub tags: HashMap<String, String>,
}

impl Instance {
    pub fn queue_name(&self) -> Option<&str> {
        self.tags.get(TAG_QUEUE_NAME).map(String::as_str)
    }

    pub fn compute_resource_name(&self) -> Option<&str> {
        self.tags.get(TAG_COMPUTE_RESOURCE_NAME).map(String::as_str)
    }

    pub fn node_name_tag(&self) -> Option<&str> {
        self.tags.get(TAG_NODE_NAME).map(String::as_str)
    }

    /// True iff the full required tag tuple (§8 "Universals") is present.
    pub fn has_required_tags(&self) -> bool {
        self.tags.contains_key(TAG_CLUSTER_NAME)
            && self.tags.contains_key(TAG_NODE_TYPE)
            && self.tags.contains_key(TAG_QUEUE_NAME)
            && self.tags.contains_key(TAG_COMPUTE_RESOURCE_NAME)
    }

    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now.signed_duration_since(self.launch_time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_dynamic_node_name() {
        let n = NodeName::parse("queue1-dy-cr1-3").unwrap();
        assert_eq!(n.queue, "queue1");
        assert_eq!(n.node_type, NodeType::Dynamic);
        assert_eq!(n.compute_resource, "cr1");
        assert_eq!(n.index, 3);
    }

    #[test]
    fn parses_static_node_name_with_hyphenated_compute_resource() {
        // compute-resource names may themselves contain hyphens; rsplitn
        // keeps them intact because we split from the right.
        let n = NodeName::parse("gpu-queue-st-big-gpu-cr-1").unwrap();
        assert_eq!(n.queue, "gpu-queue");
        assert_eq!(n.node_type, NodeType::Static);
        assert_eq!(n.compute_resource, "big-gpu-cr");
        assert_eq!(n.index, 1);
    }

    #[test]
    fn rejects_malformed_node_name() {
        assert!(NodeName::parse("not-a-node-name").is_err());
        assert!(NodeName::parse("queue-bogus-cr-1").is_err());
    }

    #[test]
    fn node_is_assigned_only_with_real_addr() {
        let mut node = sample_node();
        assert!(!node.is_assigned());
        node.node_addr = Some(UNASSIGNED_ADDR.to_string());
        assert!(!node.is_assigned());
        node.node_addr = Some("10.0.1.5".to_string());
        assert!(node.is_assigned());
    }

    fn sample_node() -> Node {
        Node {
            name: NodeName::parse("queue1-dy-cr1-1").unwrap(),
            state: NodeStateFlags::default(),
            reason: None,
            last_busy: None,
            node_addr: None,
            node_hostname: None,
            reservation: None,
        }
    }

    #[test]
    fn instance_requires_all_four_tags() {
        let mut tags = HashMap::new();
        tags.insert(TAG_CLUSTER_NAME.to_string(), "c".to_string());
        tags.insert(TAG_NODE_TYPE.to_string(), NODE_TYPE_COMPUTE.to_string());
        tags.insert(TAG_QUEUE_NAME.to_string(), "queue1".to_string());
        let instance = Instance {
            instance_id: "i-1".to_string(),
            private_ip: None,
            private_dns: None,
            instance_type: "c5.xlarge".to_string(),
            launch_time: Utc::now(),
            state: InstanceState::Running,
            tags,
        };
        assert!(!instance.has_required_tags());
    }
}
