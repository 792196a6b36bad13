//! Issues `scontrol` commands against the local Slurm daemon (§4.2).
//!
//! clustermgtd and the resume/suspend programs all run on the head node
//! alongside `slurmctld`, so command issuance is a local process spawn
//! rather than a remote dispatch: a local child process's exit status *is*
//! the completion signal, so there's no separate invocation to poll, just
//! a small retry budget around the spawn itself.

use std::path::PathBuf;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{Result, SchedulerError};
use crate::parser::parse_node_listing;
use pcluster_core::Node;

/// Small, fixed retry budget for transient `scontrol`/`slurmctld` hiccups
/// (a restart in progress, a momentary RPC timeout) — not a general-purpose
/// backoff policy, since a persistently broken scheduler should surface as
/// `SchedulerError::Fatal` quickly rather than be masked for minutes (§4.2).
const MAX_ATTEMPTS: u32 = 3;
const RETRY_BASE_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct SlurmScheduler {
    scontrol_path: PathBuf,
}

impl Default for SlurmScheduler {
    fn default() -> Self {
        Self { scontrol_path: PathBuf::from("scontrol") }
    }
}

impl SlurmScheduler {
    pub fn new(scontrol_path: impl Into<PathBuf>) -> Self {
        Self { scontrol_path: scontrol_path.into() }
    }

    async fn run(&self, args: &[&str]) -> Result<String> {
        let mut last_err = None;
        for attempt in 1..=MAX_ATTEMPTS {
            match self.run_once(args).await {
                Ok(stdout) => return Ok(stdout),
                Err(err) => {
                    warn!(attempt, args = ?args, error = %err, "scontrol command failed, retrying");
                    last_err = Some(err);
                    if attempt < MAX_ATTEMPTS {
                        tokio::time::sleep(RETRY_BASE_DELAY * attempt).await;
                    }
                }
            }
        }
        Err(SchedulerError::Fatal(
            last_err.map(|e| e.to_string()).unwrap_or_else(|| "scontrol command failed".to_string()),
        ))
    }

    async fn run_once(&self, args: &[&str]) -> Result<String> {
        debug!(path = %self.scontrol_path.display(), args = ?args, "invoking scontrol");
        let output = Command::new(&self.scontrol_path).args(args).output().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            return Err(SchedulerError::Fatal(format!(
                "scontrol {:?} exited with {:?}: {}",
                args, output.status.code(), stderr
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// Full cluster node listing (§4.2, §4.6 "snapshot").
    pub async fn list_nodes(&self) -> Result<Vec<Node>> {
        let stdout = self.run(&["show", "nodes", "--detail"]).await?;
        parse_node_listing(&stdout)
    }

    /// Binds a launched instance to a node after tag propagation (§4.3 step 4).
    pub async fn bind_node(&self, node_name: &str, addr: &str, hostname: &str) -> Result<()> {
        let addr_arg = format!("NodeAddr={addr}");
        let hostname_arg = format!("NodeHostName={hostname}");
        let name_arg = format!("NodeName={node_name}");
        self.run(&["update", &name_arg, &addr_arg, &hostname_arg]).await?;
        Ok(())
    }

    /// Marks a node unhealthy without touching its power state directly —
    /// `clustermgtd`'s classifier decides whether the backing instance also
    /// gets terminated (§4.5, §4.6).
    pub async fn mark_down(&self, node_name: &str, reason: &str) -> Result<()> {
        let name_arg = format!("NodeName={node_name}");
        let state_arg = "State=DOWN".to_string();
        let reason_arg = format!("Reason={reason}");
        self.run(&["update", &name_arg, &state_arg, &reason_arg]).await?;
        Ok(())
    }

    /// Drains a node without marking it down outright: running jobs finish,
    /// no new jobs are scheduled on it. Used for a capacity-block
    /// reservation that has expired or been cancelled, where the right
    /// move is to let in-flight work complete rather than kill it (§3
    /// "drain" state flag, §4.5 capacity-block classifier).
    pub async fn drain(&self, node_name: &str, reason: &str) -> Result<()> {
        let name_arg = format!("NodeName={node_name}");
        let reason_arg = format!("Reason={reason}");
        self.run(&["update", &name_arg, "State=DRAIN", &reason_arg]).await?;
        Ok(())
    }

    /// Forces a dynamic node back to the power-saving pool (§4.4, suspend).
    pub async fn power_down_force(&self, node_name: &str) -> Result<()> {
        let name_arg = format!("NodeName={node_name}");
        self.run(&["update", &name_arg, "State=POWER_DOWN_FORCE"]).await?;
        Ok(())
    }

    /// Requests scheduler-driven power-up, used when clustermgtd resets a
    /// node out of a failed bootstrap rather than leaving it powered down
    /// (§4.6 step 5).
    pub async fn power_up(&self, node_name: &str) -> Result<()> {
        let name_arg = format!("NodeName={node_name}");
        self.run(&["update", &name_arg, "State=POWER_UP"]).await?;
        Ok(())
    }

    /// Re-reads `slurm.conf` after a fleet-config change (§4.2).
    pub async fn reconfigure(&self) -> Result<()> {
        self.run(&["reconfigure"]).await?;
        Ok(())
    }
}
