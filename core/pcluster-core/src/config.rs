//! Layered configuration: built-in defaults, overridden by an optional
//! config file, overridden by environment variables prefixed `PCLUSTER_`.
//!
//! Every binary in this workspace loads one `Config` at startup and threads
//! it through explicitly — there is no ambient global (§9 "Global state").

use std::path::PathBuf;
use std::time::Duration;

use figment::providers::{Env, Format, Json, Serialized};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::error::{PclusterError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub cluster_name: String,
    pub region: String,

    /// clustermgtd/computemgtd loop period (§4.6, §4.7).
    pub loop_time_secs: u64,

    /// §4.5 bootstrap-failed classifier threshold.
    pub bootstrap_timeout_secs: u64,

    /// §4.5 orphan classifier threshold.
    pub orphan_grace_period_secs: u64,

    /// Minimum grace given to any instance regardless of tag visibility,
    /// to avoid racing the cloud provider's own tag-propagation lag (§9).
    pub tag_propagation_grace_secs: u64,

    /// §4.6 step 4: consecutive bootstrap-failure count that trips
    /// `FleetStatus::Protected`.
    pub protected_failure_count: u32,

    /// External-watchdog contract: iterations whose heartbeat is older
    /// than this are considered stuck (§5).
    pub heartbeat_max_age_secs: u64,

    /// Provider per-call instance limit for a single launch-fleet/run-
    /// instances call (§4.3 step 3).
    pub launch_max_batch_size: u32,

    /// Bound on concurrent queue×compute-resource fan-out (§5).
    pub worker_pool_size: usize,

    /// Per cloud-API call deadline before the adapter gives up and returns
    /// a typed transient error (§4.1).
    pub per_call_timeout_secs: u64,

    /// §4.7: self-terminate after this many consecutive unreachable
    /// iterations against the head node.
    pub disable_all_cluster_management_iterations: u32,

    /// Reason substrings that classify a DOWN node as unhealthy — exposed
    /// as config per the §9 Open Question decision, not hard-coded.
    pub unhealthy_reason_patterns: Vec<String>,

    pub fleet_config_path: PathBuf,
    pub run_instances_overrides_path: Option<PathBuf>,
    pub create_fleet_overrides_path: Option<PathBuf>,
    pub fleet_status_cache_path: PathBuf,
    pub heartbeat_path: PathBuf,

    /// Local cache of per-compute-resource ICE cooldowns, written by
    /// `resume` and read by the next invocation (§4.3 step 5). There is no
    /// long-running `resume` process to hold this in memory — each
    /// invocation is a fresh CLI process.
    pub cr_cooldown_cache_path: PathBuf,
    pub cr_cooldown_secs: u64,

    /// S3 object backing the durable `FleetStatusStore` (§6). Missing
    /// object reads back as `FleetStatus::Unknown`.
    pub fleet_status_s3_bucket: String,
    pub fleet_status_s3_key: String,

    /// Route 53 hosted zone for compute-node DNS records. `None` disables
    /// DNS management entirely (§6 "Non-goals").
    pub dns_hosted_zone_id: Option<String>,

    /// Head node private IP, written into every compute node's environment
    /// at launch. `computemgtd` probes this address each iteration (§4.7).
    pub head_node_private_ip: Option<String>,

    /// TCP port probed for head-node reachability — the `slurmctld` port,
    /// since the thing `computemgtd` actually cares about is "can this node
    /// still talk to the scheduler", not raw ICMP reachability.
    pub head_node_reachability_port: u16,

    /// Grace window `computemgtd` gives a scheduled maintenance event
    /// before self-terminating ahead of it (§4.7).
    pub scheduled_event_grace_secs: u64,

    pub log_dir: PathBuf,
    /// Default `EnvFilter` directive; overridden by `RUST_LOG` if set (§6).
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cluster_name: "parallelcluster".to_string(),
            region: "us-east-1".to_string(),
            loop_time_secs: 60,
            bootstrap_timeout_secs: 1800,
            orphan_grace_period_secs: 120,
            tag_propagation_grace_secs: 120,
            protected_failure_count: 3,
            heartbeat_max_age_secs: 300,
            launch_max_batch_size: 500,
            worker_pool_size: 10,
            per_call_timeout_secs: 30,
            disable_all_cluster_management_iterations: 5,
            unhealthy_reason_patterns: vec![
                "NodeReplaceTimeout".to_string(),
                "reboot-failed".to_string(),
                "non-responsive".to_string(),
                "failing health checks".to_string(),
            ],
            fleet_config_path: PathBuf::from("/etc/parallelcluster/fleet-config.json"),
            run_instances_overrides_path: None,
            create_fleet_overrides_path: None,
            fleet_status_cache_path: PathBuf::from(
                "/var/run/parallelcluster/compute_fleet_status.json",
            ),
            heartbeat_path: PathBuf::from("/var/run/parallelcluster/clustermgtd.heartbeat"),
            cr_cooldown_cache_path: PathBuf::from("/var/run/parallelcluster/cr_cooldown.json"),
            cr_cooldown_secs: 300,
            fleet_status_s3_bucket: String::new(),
            fleet_status_s3_key: "compute_fleet_status.json".to_string(),
            dns_hosted_zone_id: None,
            head_node_private_ip: None,
            head_node_reachability_port: 6820,
            scheduled_event_grace_secs: 120,
            log_dir: PathBuf::from("/var/log/parallelcluster"),
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load defaults, then merge an optional JSON config file, then merge
    /// `PCLUSTER_*` environment variables — each layer overrides the last.
    pub fn load(config_file: Option<&std::path::Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));

        if let Some(path) = config_file {
            figment = figment.merge(Json::file(path));
        }

        figment = figment.merge(Env::prefixed("PCLUSTER_").split("__"));

        figment
            .extract()
            .map_err(|e| PclusterError::config(e.to_string()))
    }

    pub fn loop_time(&self) -> Duration {
        Duration::from_secs(self.loop_time_secs)
    }

    pub fn bootstrap_timeout(&self) -> Duration {
        Duration::from_secs(self.bootstrap_timeout_secs)
    }

    pub fn orphan_grace_period(&self) -> Duration {
        Duration::from_secs(self.orphan_grace_period_secs)
    }

    pub fn tag_propagation_grace(&self) -> Duration {
        Duration::from_secs(self.tag_propagation_grace_secs)
    }

    pub fn heartbeat_max_age(&self) -> Duration {
        Duration::from_secs(self.heartbeat_max_age_secs)
    }

    pub fn per_call_timeout(&self) -> Duration {
        Duration::from_secs(self.per_call_timeout_secs)
    }

    pub fn scheduled_event_grace(&self) -> Duration {
        Duration::from_secs(self.scheduled_event_grace_secs)
    }

    pub fn cr_cooldown(&self) -> Duration {
        Duration::from_secs(self.cr_cooldown_secs)
    }
}
