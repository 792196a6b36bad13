//! Pure self-termination decision logic (§4.7), kept separate from the I/O
//! that gathers its inputs — the same "classifier is a total function of a
//! snapshot" shape `health-policy` uses for clustermgtd, scaled down to
//! computemgtd's single node's worth of state.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use cloud_traits::ScheduledEvent;
use pcluster_core::FleetStatus;

/// Why computemgtd decided to terminate its own instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelfTerminateReason {
    FleetStopped,
    HeadNodeUnreachable,
    ScheduledMaintenance,
}

/// One iteration's observations, gathered by `main.rs` and handed to
/// `decide` with no further I/O.
pub struct WatchdogSnapshot<'a> {
    pub fleet_status: FleetStatus,
    pub head_node_reachable: bool,
    pub scheduled_events: &'a [ScheduledEvent],
    pub self_instance_id: &'a str,
    pub now: DateTime<Utc>,
    pub event_grace: ChronoDuration,
}

/// Tracks the consecutive-unreachable-iteration count that gates
/// self-termination on head-node unreachability (§4.7: "unreachable for
/// more than `disable_all_cluster_management * N` consecutive iterations").
#[derive(Debug, Default)]
pub struct UnreachableCounter {
    consecutive: u32,
}

impl UnreachableCounter {
    /// Records this iteration's reachability result and returns the
    /// updated consecutive-failure count.
    pub fn record(&mut self, reachable: bool) -> u32 {
        if reachable {
            self.consecutive = 0;
        } else {
            self.consecutive += 1;
        }
        self.consecutive
    }
}

/// Decides whether to self-terminate this iteration. Checked in the order
/// listed in §4.7: fleet-stopped first (an operator-requested shutdown
/// always wins), then head-node isolation, then imminent maintenance.
pub fn decide(
    snapshot: &WatchdogSnapshot<'_>,
    consecutive_unreachable: u32,
    unreachable_threshold: u32,
) -> Option<SelfTerminateReason> {
    if snapshot.fleet_status.is_terminal_stop() {
        return Some(SelfTerminateReason::FleetStopped);
    }

    if consecutive_unreachable >= unreachable_threshold {
        return Some(SelfTerminateReason::HeadNodeUnreachable);
    }

    let imminent = snapshot
        .scheduled_events
        .iter()
        .filter(|event| event.instance_id == snapshot.self_instance_id)
        .any(|event| event.not_before - snapshot.now <= snapshot.event_grace);
    if imminent {
        return Some(SelfTerminateReason::ScheduledMaintenance);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_snapshot(events: &[ScheduledEvent]) -> WatchdogSnapshot<'_> {
        WatchdogSnapshot {
            fleet_status: FleetStatus::Started,
            head_node_reachable: true,
            scheduled_events: events,
            self_instance_id: "i-self",
            now: Utc::now(),
            event_grace: ChronoDuration::seconds(120),
        }
    }

    #[test]
    fn fleet_stopped_wins_regardless_of_everything_else() {
        let mut snapshot = base_snapshot(&[]);
        snapshot.fleet_status = FleetStatus::Stopped;
        assert_eq!(decide(&snapshot, 0, 5), Some(SelfTerminateReason::FleetStopped));
    }

    #[test]
    fn unreachable_below_threshold_does_not_terminate() {
        let snapshot = base_snapshot(&[]);
        assert_eq!(decide(&snapshot, 4, 5), None);
    }

    #[test]
    fn unreachable_at_threshold_terminates() {
        let snapshot = base_snapshot(&[]);
        assert_eq!(decide(&snapshot, 5, 5), Some(SelfTerminateReason::HeadNodeUnreachable));
    }

    #[test]
    fn imminent_scheduled_event_for_self_terminates() {
        let now = Utc::now();
        let events = vec![ScheduledEvent {
            instance_id: "i-self".to_string(),
            code: "instance-retirement".to_string(),
            not_before: now + ChronoDuration::seconds(30),
        }];
        let mut snapshot = base_snapshot(&events);
        snapshot.now = now;
        assert_eq!(decide(&snapshot, 0, 5), Some(SelfTerminateReason::ScheduledMaintenance));
    }

    #[test]
    fn scheduled_event_for_another_instance_is_ignored() {
        let now = Utc::now();
        let events = vec![ScheduledEvent {
            instance_id: "i-other".to_string(),
            code: "instance-retirement".to_string(),
            not_before: now + ChronoDuration::seconds(30),
        }];
        let mut snapshot = base_snapshot(&events);
        snapshot.now = now;
        assert_eq!(decide(&snapshot, 0, 5), None);
    }

    #[test]
    fn unreachable_counter_resets_on_success() {
        let mut counter = UnreachableCounter::default();
        assert_eq!(counter.record(false), 1);
        assert_eq!(counter.record(false), 2);
        assert_eq!(counter.record(true), 0);
        assert_eq!(counter.record(false), 1);
    }
}
