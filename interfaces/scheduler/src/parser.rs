//! Parses `scontrol show nodes --detail` output into `Vec<Node>` (§4.2).
//!
//! Slurm prints one record per node as a run of whitespace-separated
//! `Key=Value` tokens, wrapping onto however many lines the terminal width
//! demands; blank lines separate records. We don't rely on line breaks at
//! all — only on the blank-line record boundary — so wrapping width never
//! matters.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use pcluster_core::{Node, NodeName, NodeStateFlags};

use crate::error::{Result, SchedulerError};

fn tokenize_record(record: &str) -> HashMap<String, String> {
    let mut fields = HashMap::new();
    for token in record.split_whitespace() {
        if let Some((key, value)) = token.split_once('=') {
            fields.insert(key.to_string(), value.to_string());
        }
    }
    fields
}

/// `State=IDLE+CLOUD+POWERED_DOWN` style flag strings, `+`-joined with no
/// fixed ordering.
fn parse_state_flags(raw: &str) -> NodeStateFlags {
    let mut flags = NodeStateFlags::default();
    for part in raw.split('+') {
        match part {
            "POWER_DOWN" | "POWERING_DOWN" => flags.power_saving = true,
            "POWERED_DOWN" => flags.powered_down = true,
            "POWERING_UP" | "POWER_UP" => flags.powering_up = true,
            "DRAIN" => flags.drain = true,
            "DOWN" => flags.down = true,
            "IDLE" => flags.idle = true,
            "ALLOCATED" => flags.alloc = true,
            "MIXED" => flags.mix = true,
            "COMPLETING" => flags.completing = true,
            _ => {}
        }
    }
    flags
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if raw == "None" || raw == "Unknown" || raw.is_empty() {
        return None;
    }
    chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

fn non_empty(raw: Option<&String>) -> Option<String> {
    raw.filter(|s| !s.is_empty() && s.as_str() != "(null)" && s.as_str() != "N/A")
        .cloned()
}

/// Parses one node record. A node name that doesn't match the
/// `{queue}-{type}-{compute-resource}-{index}` convention is skipped with a
/// warning rather than failing the whole listing — a malformed or
/// hand-added node shouldn't take clustermgtd's view of every other node
/// down with it.
fn parse_record(record: &str) -> Option<Node> {
    let fields = tokenize_record(record);
    let raw_name = fields.get("NodeName")?;
    let name = match NodeName::parse(raw_name) {
        Ok(name) => name,
        Err(err) => {
            tracing::warn!(node = %raw_name, error = %err, "skipping node with unparseable name");
            return None;
        }
    };

    let state = fields
        .get("State")
        .map(|s| parse_state_flags(s))
        .unwrap_or_default();

    Some(Node {
        name,
        state,
        reason: non_empty(fields.get("Reason")),
        last_busy: fields.get("LastBusyTime").and_then(|s| parse_timestamp(s)),
        node_addr: non_empty(fields.get("NodeAddr")),
        node_hostname: non_empty(fields.get("NodeHostName")),
        reservation: non_empty(fields.get("Reservation")),
    })
}

/// Parses the full `scontrol show nodes --detail` text. Records with an
/// unparseable name are dropped (with a warning), not treated as a parse
/// failure for the whole listing.
pub fn parse_node_listing(output: &str) -> Result<Vec<Node>> {
    let mut nodes = Vec::new();
    for record in output.split("\n\n") {
        let record = record.trim();
        if record.is_empty() {
            continue;
        }
        if let Some(node) = parse_record(record) {
            nodes.push(node);
        }
    }
    Ok(nodes)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "NodeName=queue1-dy-cr1-1 Arch=x86_64 CoresPerSocket=4\n   \
CPUAlloc=0 CPUTot=4 NodeAddr=10.0.1.5 NodeHostName=ip-10-0-1-5\n   \
State=IDLE+CLOUD Reason=(null) LastBusyTime=2026-07-28T10:00:00\n\n\
NodeName=queue1-st-cr1-2 NodeAddr=NodeAddr NodeHostName=NodeHostName\n   \
State=DOWN+CLOUD+POWERED_DOWN Reason=static-node-maintenance\n";

    #[test]
    fn parses_two_node_records() {
        let nodes = parse_node_listing(SAMPLE).unwrap();
        assert_eq!(nodes.len(), 2);

        let first = &nodes[0];
        assert_eq!(first.name.as_str(), "queue1-dy-cr1-1");
        assert!(first.state.idle);
        assert_eq!(first.node_addr.as_deref(), Some("10.0.1.5"));
        assert!(first.reason.is_none());

        let second = &nodes[1];
        assert!(second.state.down);
        assert!(second.state.powered_down);
        assert_eq!(second.reason.as_deref(), Some("static-node-maintenance"));
        assert!(!second.is_assigned());
    }

    #[test]
    fn empty_output_yields_empty_listing() {
        assert_eq!(parse_node_listing("").unwrap().len(), 0);
        assert_eq!(parse_node_listing("   \n\n  ").unwrap().len(), 0);
    }

    #[test]
    fn skips_record_with_malformed_node_name() {
        let listing = "NodeName=not-a-node-name State=IDLE\n";
        let nodes = parse_node_listing(listing).unwrap();
        assert!(nodes.is_empty());
    }
}
