//! SuspendProgram (§4.4): logs power-down intent for a hostlist of nodes.
//!
//! Deliberately does nothing else. Termination stays `clustermgtd`'s job —
//! it sees these nodes powered down on its next sweep and terminates their
//! backing instances there, after confirming no in-flight `resume` binding
//! is racing the same node (§4.4 "avoids a race where an in-flight launch's
//! instance is terminated before its binding is written back").

pub mod error;

pub use error::{Result, SuspendError};

use tracing::info;

/// Logs intent for every node in `node_names` and returns how many were
/// logged. No scheduler or cloud call: `slurmctld` has already transitioned
/// these nodes to power-down state by the time it invokes this program.
pub fn log_power_down_intent(node_names: &[String]) -> usize {
    for name in node_names {
        info!(node = %name, "power-down intent received");
    }
    node_names.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logs_every_node_and_returns_count() {
        let nodes = vec!["queue1-dy-cr1-1".to_string(), "queue1-dy-cr1-2".to_string()];
        assert_eq!(log_power_down_intent(&nodes), 2);
    }

    #[test]
    fn empty_list_logs_nothing() {
        assert_eq!(log_power_down_intent(&[]), 0);
    }
}
