//! suspend: the SuspendProgram entry point (§4.4, §6).
//!
//! Invoked by the scheduler with a hostlist of nodes it has just powered
//! down. Never terminates instances itself — see `lib.rs`.

use std::path::PathBuf;

use clap::Parser;
use pcluster_core::Config;

#[derive(Parser)]
#[command(name = "suspend", about = "ParallelCluster scheduler power-down handler")]
struct Cli {
    /// Space-separated and/or Slurm-bracketed hostlist, as the scheduler
    /// hands it to a `SuspendProgram`.
    nodes: String,

    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    std::fs::create_dir_all(&config.log_dir).ok();
    let _log_guard = pcluster_core::logging::init(&config.log_dir, "suspend", &config.log_level);

    let node_names: Vec<String> = cli
        .nodes
        .split_whitespace()
        .flat_map(pcluster_scheduler::expand_hostlist)
        .collect();

    let count = suspend::log_power_down_intent(&node_names);
    tracing::info!(cluster = %config.cluster_name, count, "suspend complete");

    Ok(())
}
