//! The cluster-wide compute-fleet status state machine (§3, §4.6).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single process-wide value, persisted in durable object storage, that
/// gates whether clustermgtd is allowed to launch new instances.
///
/// This is modeled as data, not an ambient singleton (§9 "Global state") —
/// every component that reads or writes it is handed a `FleetStatusStore`
/// handle explicitly (defined in `cloud-traits`, implemented in `cloud-aws`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FleetStatus {
    Started,
    StopRequested,
    Stopped,
    StartRequested,
    Stopping,
    Starting,
    /// No further launches until an operator clears this (§4.6 step 4).
    Protected,
    Unknown,
}

impl FleetStatus {
    /// clustermgtd refuses to launch anything unless the fleet is fully
    /// `Started` (§3 invariant 5).
    pub fn allows_launch(&self) -> bool {
        matches!(self, Self::Started)
    }

    pub fn is_terminal_stop(&self) -> bool {
        matches!(self, Self::Stopped)
    }
}

impl Default for FleetStatus {
    fn default() -> Self {
        Self::Unknown
    }
}

/// The local cache file mirrors `{status, last_updated_timestamp}` so
/// scripts and `computemgtd` can read the status without a round-trip to
/// the object store (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetStatusCache {
    pub status: FleetStatus,
    pub last_updated_timestamp: DateTime<Utc>,
}

impl FleetStatusCache {
    pub fn new(status: FleetStatus) -> Self {
        Self {
            status,
            last_updated_timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_started_allows_launch() {
        assert!(FleetStatus::Started.allows_launch());
        for s in [
            FleetStatus::StopRequested,
            FleetStatus::Stopped,
            FleetStatus::StartRequested,
            FleetStatus::Stopping,
            FleetStatus::Starting,
            FleetStatus::Protected,
            FleetStatus::Unknown,
        ] {
            assert!(!s.allows_launch());
        }
    }

    #[test]
    fn cache_round_trips_through_json() {
        let cache = FleetStatusCache::new(FleetStatus::Started);
        let json = serde_json::to_string(&cache).unwrap();
        let back: FleetStatusCache = serde_json::from_str(&json).unwrap();
        assert_eq!(back.status, cache.status);
    }
}
