//! Per-compute-resource ICE cooldown cache (§4.3 step 5, §7).
//!
//! `resume` is a short-lived CLI invoked fresh by the scheduler for every
//! power-up event — there is no long-running process to hold a cooldown
//! timer in memory, so it is persisted to a small JSON file in the same
//! style `cloud-aws::overrides::OverridesFile` reads its two override
//! files: a missing or malformed file is never fatal, just treated as "no
//! cooldowns active".

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

fn key(queue: &str, compute_resource: &str) -> String {
    format!("{queue}#{compute_resource}")
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CooldownCache {
    /// `"{queue}#{compute_resource}" -> cooldown expiry`.
    entries: HashMap<String, DateTime<Utc>>,
}

impl CooldownCache {
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(data) => serde_json::from_str(&data).unwrap_or_else(|err| {
                warn!(path = %path.display(), error = %err, "ignoring malformed CR cooldown cache");
                Self::default()
            }),
            Err(_) => {
                debug!(path = %path.display(), "no CR cooldown cache present");
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_vec_pretty(self).unwrap_or_default();
        std::fs::write(path, json)
    }

    pub fn is_on_cooldown(&self, queue: &str, compute_resource: &str, now: DateTime<Utc>) -> bool {
        self.entries.get(&key(queue, compute_resource)).is_some_and(|expiry| *expiry > now)
    }

    pub fn mark(&mut self, queue: &str, compute_resource: &str, until: DateTime<Utc>) {
        self.entries.insert(key(queue, compute_resource), until);
    }

    /// Drops expired entries so the cache file doesn't grow forever across
    /// the lifetime of a long-running cluster.
    pub fn prune(&mut self, now: DateTime<Utc>) {
        self.entries.retain(|_, expiry| *expiry > now);
    }
}
