//! Reads partition (queue) topology out of the scheduler's own
//! configuration so clustermgtd can cross-check it against `fleet-config.json`
//! and flag drift between the two instead of trusting either blindly (§4.2).

use std::collections::HashMap;
use std::path::Path;

use crate::error::{Result, SchedulerError};

/// `queue name -> node names it contains`, parsed from a `slurm.conf`-style
/// `PartitionName=... Nodes=...` line. Slurm hostlist range syntax
/// (`queue1-dy-cr1-[1-10]`) is expanded so each name matches what
/// `parser::parse_node_listing` produces from `scontrol show nodes`.
pub fn load_partition_topology(path: &Path) -> Result<HashMap<String, Vec<String>>> {
    let text = std::fs::read_to_string(path)?;
    let mut topology = HashMap::new();

    for line in text.lines() {
        let line = line.trim();
        if !line.starts_with("PartitionName=") {
            continue;
        }
        let mut partition_name = None;
        let mut nodes = Vec::new();
        for token in line.split_whitespace() {
            if let Some(value) = token.strip_prefix("PartitionName=") {
                partition_name = Some(value.to_string());
            } else if let Some(value) = token.strip_prefix("Nodes=") {
                nodes = expand_hostlist(value);
            }
        }
        let Some(name) = partition_name else {
            return Err(SchedulerError::ParseError(format!(
                "partition line missing PartitionName: {line}"
            )));
        };
        topology.insert(name, nodes);
    }

    Ok(topology)
}

/// Expands Slurm hostlist syntax: `prefix-[1-3,7]` -> `prefix-1, prefix-2,
/// prefix-3, prefix-7`; a plain comma-separated list passes through as-is.
///
/// Shared with `resume`/`suspend` (§4.3 step 1, §4.4), which receive their
/// node-name argument from the scheduler in the same hostlist-expanded (or
/// still-bracketed) form as a `Nodes=` line.
pub fn expand_hostlist(raw: &str) -> Vec<String> {
    let mut names = Vec::new();
    for entry in raw.split(',') {
        match entry.find('[') {
            Some(open) if entry.ends_with(']') => {
                let prefix = &entry[..open];
                let range_spec = &entry[open + 1..entry.len() - 1];
                for part in range_spec.split(',') {
                    if let Some((start, end)) = part.split_once('-') {
                        if let (Ok(start), Ok(end)) = (start.parse::<u32>(), end.parse::<u32>()) {
                            for i in start..=end {
                                names.push(format!("{prefix}{i}"));
                            }
                            continue;
                        }
                    }
                    names.push(format!("{prefix}{part}"));
                }
            }
            _ => names.push(entry.to_string()),
        }
    }
    names
}
