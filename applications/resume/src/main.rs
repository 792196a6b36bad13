//! resume: the ResumeProgram entry point (§4.3, §6).
//!
//! Invoked fresh by the scheduler for every power-up event, with an
//! expanded-or-bracketed hostlist of node names as its sole positional
//! argument. Exits 0 iff every requested node ended up bound.

use std::path::PathBuf;
use std::process::ExitCode;

use chrono::Utc;
use clap::Parser;
use cloud_aws::{overrides::OverridesFile, retry::RetryPolicy, AwsCloudApi};
use cloud_traits::{CloudApi, DnsChange};
use pcluster_core::{Config, FleetConfig};
use pcluster_scheduler::SlurmScheduler;
use resume::{cooldown::CooldownCache, pipeline, ResumeContext};
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "resume", about = "ParallelCluster scheduler power-up handler")]
struct Cli {
    /// Space-separated and/or Slurm-bracketed hostlist, as the scheduler
    /// hands it to a `ResumeProgram` (§4.3 "Invocation").
    nodes: String,

    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    std::fs::create_dir_all(&config.log_dir).ok();
    let _log_guard = pcluster_core::logging::init(&config.log_dir, "resume", &config.log_level);

    let node_names = expand_requested_nodes(&cli.nodes);
    info!(cluster = %config.cluster_name, node_count = node_names.len(), "resume invoked");

    if node_names.is_empty() {
        warn!(raw = %cli.nodes, "resume invoked with no parseable node names");
        return Ok(ExitCode::SUCCESS);
    }

    let fleet_config = FleetConfig::load(&config.fleet_config_path)?;
    let run_instances_overrides = config
        .run_instances_overrides_path
        .as_deref()
        .map(OverridesFile::load)
        .unwrap_or_default();
    let create_fleet_overrides = config
        .create_fleet_overrides_path
        .as_deref()
        .map(OverridesFile::load)
        .unwrap_or_default();

    let cloud = AwsCloudApi::from_region(config.region.clone())
        .await
        .with_retry_policy(RetryPolicy::default());
    let scheduler = SlurmScheduler::default();

    let now = Utc::now();
    let mut cooldown = CooldownCache::load(&config.cr_cooldown_cache_path);
    cooldown.prune(now);

    let ctx = ResumeContext {
        cloud: &cloud,
        scheduler: &scheduler,
        fleet_config: &fleet_config,
        run_instances_overrides: &run_instances_overrides,
        create_fleet_overrides: &create_fleet_overrides,
        config: &config,
        cluster_name: &config.cluster_name,
    };

    let (report, newly_cooling_down) = pipeline::run(&ctx, &node_names, &cooldown, now).await?;

    for (queue, cr) in &newly_cooling_down {
        cooldown.mark(queue, cr, now + chrono::Duration::from_std(config.cr_cooldown()).unwrap());
    }
    if !newly_cooling_down.is_empty() {
        if let Err(err) = cooldown.save(&config.cr_cooldown_cache_path) {
            warn!(error = %err, "failed to persist CR cooldown cache");
        }
    }

    apply_dns_upserts(&cloud, &config, &report).await;

    let bound = report.results.iter().filter(|r| matches!(r.outcome, pipeline::NodeOutcome::Bound)).count();
    let failed = report.results.len() - bound;
    info!(bound, failed, "resume complete");

    if report.all_bound() {
        Ok(ExitCode::SUCCESS)
    } else {
        error!(failed, "resume did not bind every requested node");
        Ok(ExitCode::FAILURE)
    }
}

/// The scheduler may hand us several whitespace-separated hostlist tokens,
/// each of which may itself still carry Slurm bracket-range syntax.
fn expand_requested_nodes(raw: &str) -> Vec<String> {
    raw.split_whitespace()
        .flat_map(pcluster_scheduler::expand_hostlist)
        .collect()
}

async fn apply_dns_upserts(cloud: &AwsCloudApi, config: &Config, report: &pipeline::ResumeReport) {
    let Some(zone_id) = config.dns_hosted_zone_id.as_deref() else {
        if !report.dns_upserts.is_empty() {
            warn!("no DNS hosted zone configured; skipping DNS upserts for bound nodes");
        }
        return;
    };
    if report.dns_upserts.is_empty() {
        return;
    }

    let changes: Vec<DnsChange> = report
        .dns_upserts
        .iter()
        .map(|(name, ip)| DnsChange::Upsert { name: name.clone(), ip: ip.clone() })
        .collect();

    if let Err(err) = cloud.apply_dns_changes(zone_id, &changes).await {
        warn!(error = %err, "failed to apply DNS upserts for bound nodes");
    }
}
