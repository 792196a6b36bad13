//! Head-node reachability probe (§4.7): "can this compute node still talk
//! to the scheduler" is modeled as a bounded TCP connect to the
//! `slurmctld` port, not raw ICMP — a compute node with no cluster
//! management story left (security groups torn down, head node replaced)
//! fails to connect exactly as reliably as it fails to ping, and a TCP
//! probe needs no elevated privilege to run from an unprivileged daemon.

use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::timeout;

/// `None` disables the probe entirely — a compute node config that never
/// received a head-node address is a misconfiguration, not grounds to
/// self-terminate on every iteration.
pub async fn head_node_reachable(addr: Option<&str>, port: u16, probe_timeout: Duration) -> bool {
    let Some(addr) = addr else { return true };
    let target = format!("{addr}:{port}");
    matches!(timeout(probe_timeout, TcpStream::connect(&target)).await, Ok(Ok(_)))
}
