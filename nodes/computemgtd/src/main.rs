//! computemgtd: the compute-node self-termination watchdog (§4.7).
//!
//! Runs on every compute node. Each iteration it checks, in order: has the
//! fleet been stopped, has the head node gone unreachable for too many
//! consecutive iterations, is a scheduled maintenance event imminent for
//! this instance. Any of those trips a self-terminate call against the
//! local instance id.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use cloud_aws::{retry::RetryPolicy, AwsCloudApi};
use cloud_traits::CloudApi;
use pcluster_core::{Config, FleetStatus, FleetStatusCache};
use tracing::{error, info, warn};

mod error;
mod imds;
mod reachability;
mod watchdog;

use error::Result;
use watchdog::{SelfTerminateReason, UnreachableCounter, WatchdogSnapshot};

#[derive(Parser)]
#[command(name = "computemgtd", about = "ParallelCluster compute-node self-termination watchdog")]
struct Cli {
    /// Path to a JSON config file layered over the built-in defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Run a single iteration and exit instead of looping forever.
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    std::fs::create_dir_all(&config.log_dir).ok();
    let _log_guard = pcluster_core::logging::init(&config.log_dir, "computemgtd", &config.log_level);

    let imds = imds::ImdsClient::new();
    let self_instance_id = imds.instance_id().await?;
    info!(instance_id = %self_instance_id, cluster = %config.cluster_name, "computemgtd starting");

    let cloud = AwsCloudApi::from_region(config.region.clone())
        .await
        .with_retry_policy(RetryPolicy::default());

    let mut unreachable_counter = UnreachableCounter::default();

    if cli.once {
        run_iteration(&cloud, &config, &self_instance_id, &mut unreachable_counter).await;
        return Ok(());
    }

    let mut ticker = tokio::time::interval(config.loop_time());
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                run_iteration(&cloud, &config, &self_instance_id, &mut unreachable_counter).await;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("received shutdown signal, exiting");
                break;
            }
        }
    }

    Ok(())
}

async fn run_iteration(
    cloud: &AwsCloudApi,
    config: &Config,
    self_instance_id: &str,
    unreachable_counter: &mut UnreachableCounter,
) {
    match iteration(cloud, config, self_instance_id, unreachable_counter).await {
        Ok(Some(reason)) => {
            warn!(reason = ?reason, instance_id = %self_instance_id, "self-terminating");
        }
        Ok(None) => {}
        Err(err) => {
            error!(error = %err, "computemgtd iteration failed");
        }
    }
}

async fn iteration(
    cloud: &AwsCloudApi,
    config: &Config,
    self_instance_id: &str,
    unreachable_counter: &mut UnreachableCounter,
) -> Result<Option<SelfTerminateReason>> {
    let fleet_status = read_fleet_status_cache(&config.fleet_status_cache_path);

    let reachable = reachability::head_node_reachable(
        config.head_node_private_ip.as_deref(),
        config.head_node_reachability_port,
        config.per_call_timeout(),
    )
    .await;
    let consecutive_unreachable = unreachable_counter.record(reachable);

    let scheduled_events = cloud.describe_scheduled_events(&[self_instance_id.to_string()]).await?;

    let snapshot = WatchdogSnapshot {
        fleet_status,
        head_node_reachable: reachable,
        scheduled_events: &scheduled_events,
        self_instance_id,
        now: chrono::Utc::now(),
        event_grace: chrono_duration(config.scheduled_event_grace()),
    };

    let unreachable_threshold = config.disable_all_cluster_management_iterations;
    let decision = watchdog::decide(&snapshot, consecutive_unreachable, unreachable_threshold);

    if let Some(reason) = decision {
        cloud.terminate(&[self_instance_id.to_string()]).await?;
        return Ok(Some(reason));
    }

    Ok(None)
}

/// Reads the local compute-fleet status cache file (§4.7, §6). This is the
/// file `clustermgtd` writes after every status transition — computemgtd
/// reads the cheap local mirror rather than round-tripping to the durable
/// store every iteration, matching the eventual-consistency contract in §5
/// ("readers accept eventual consistency"). A missing or unparseable file
/// (head node hasn't written one yet, or a race with a concurrent write)
/// reads back as `Unknown`, which is never treated as `Stopped`.
fn read_fleet_status_cache(path: &std::path::Path) -> FleetStatus {
    match std::fs::read_to_string(path) {
        Ok(data) => match serde_json::from_str::<FleetStatusCache>(&data) {
            Ok(cache) => cache.status,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "fleet status cache is malformed");
                FleetStatus::Unknown
            }
        },
        Err(_) => FleetStatus::Unknown,
    }
}

fn chrono_duration(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or_else(|_| chrono::Duration::zero())
}
