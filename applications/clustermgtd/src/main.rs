//! clustermgtd: the head-node reconciliation daemon (§4.6).
//!
//! Runs one `Reconciler` iteration every `loop_time`, persisting a
//! heartbeat after each pass so an external process supervisor can detect a
//! stuck or crashed loop (§5, §7).

use std::path::PathBuf;

use clap::Parser;
use clustermgtd::Reconciler;
use cloud_aws::{fleet_status_store::S3FleetStatusStore, retry::RetryPolicy, AwsCloudApi};
use pcluster_core::{Config, FleetConfig, FleetStatusCache};
use pcluster_scheduler::SlurmScheduler;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "clustermgtd", about = "ParallelCluster head-node reconciliation daemon")]
struct Cli {
    /// Path to a JSON config file layered over the built-in defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Run a single iteration and exit instead of looping forever. Used by
    /// integration tests and operators diagnosing a stuck daemon.
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    std::fs::create_dir_all(&config.log_dir).ok();
    let _log_guard = pcluster_core::logging::init(&config.log_dir, "clustermgtd", &config.log_level);

    info!(cluster = %config.cluster_name, region = %config.region, "clustermgtd starting");

    let fleet_config = FleetConfig::load(&config.fleet_config_path)?;

    let cloud = AwsCloudApi::from_region(config.region.clone())
        .await
        .with_retry_policy(RetryPolicy::default());
    let scheduler = SlurmScheduler::default();

    let s3_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(aws_types::region::Region::new(config.region.clone()))
        .load()
        .await;
    let fleet_status_store = S3FleetStatusStore::new(
        aws_sdk_s3::Client::new(&s3_config),
        config.fleet_status_s3_bucket.clone(),
        config.fleet_status_s3_key.clone(),
    );

    let mut reconciler = Reconciler {
        cloud: &cloud,
        scheduler: &scheduler,
        fleet_status_store: &fleet_status_store,
        config: &config,
        fleet_config: &fleet_config,
        dns_zone_id: config.dns_hosted_zone_id.as_deref(),
        protected_counter: Default::default(),
    };

    if cli.once {
        run_iteration(&mut reconciler, &config).await;
        return Ok(());
    }

    let mut ticker = tokio::time::interval(config.loop_time());
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                run_iteration(&mut reconciler, &config).await;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("received shutdown signal, exiting");
                break;
            }
        }
    }

    Ok(())
}

async fn run_iteration(reconciler: &mut Reconciler<'_>, config: &Config) {
    match reconciler.run_iteration().await {
        Ok(report) => {
            info!(
                terminated = report.dispatch_summary.terminated,
                marked_down = report.dispatch_summary.marked_down,
                reset = report.dispatch_summary.reset,
                drained = report.dispatch_summary.drained,
                powered_up = report.dispatch_summary.powered_up,
                dns_upserts = report.dispatch_summary.dns_upserts,
                dns_deletes = report.dispatch_summary.dns_deletes,
                protected = report.protected_tripped,
                "reconciliation iteration complete"
            );
            if let Some(status) = report.fleet_status {
                if let Err(err) = write_fleet_status_cache(config, status) {
                    warn!(error = %err, "failed to write fleet status cache");
                }
            }
        }
        Err(err) => {
            // Per-iteration errors never kill the process (§7 "Propagation")
            // unless they recur long enough for the heartbeat to go stale.
            error!(error = %err, "reconciliation iteration failed");
        }
    }

    if let Err(err) = persist_heartbeat(config) {
        warn!(error = %err, "failed to write heartbeat file");
    }
}

fn persist_heartbeat(config: &Config) -> std::io::Result<()> {
    if let Some(parent) = config.heartbeat_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&config.heartbeat_path, chrono::Utc::now().to_rfc3339())
}

fn write_fleet_status_cache(config: &Config, status: pcluster_core::FleetStatus) -> std::io::Result<()> {
    if let Some(parent) = config.fleet_status_cache_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let cache = FleetStatusCache::new(status);
    let json = serde_json::to_vec_pretty(&cache).unwrap_or_default();
    std::fs::write(&config.fleet_status_cache_path, json)
}
