//! Pure classifiers (§4.5). Every function here is a total function of its
//! arguments — no clock reads, no I/O, no hidden state — so clustermgtd's
//! reconciliation loop is testable by feeding `(snapshot, expected_actions)`
//! pairs with no cloud involved (§9).

use std::collections::HashSet;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use cloud_traits::{CapacityReservationLifecycle, ScheduledEvent};
use pcluster_core::{Instance, InstanceState, Node};

use crate::action::Action;

/// True iff `node` is bound to `instance`, the instance has been alive
/// longer than `timeout`, and the scheduler hasn't reported the node doing
/// any work — i.e. the node never finished joining the cluster.
pub fn bootstrap_failed(
    node: &Node,
    instance: &Instance,
    now: DateTime<Utc>,
    timeout: ChronoDuration,
) -> bool {
    if node.state.is_active() {
        return false;
    }
    instance.age(now) > timeout
}

/// True iff the node is DOWN with a reason matching one of
/// `unhealthy_reason_patterns` (substring match, case-sensitive — Slurm
/// reason strings are operator-authored and stable), the backing instance
/// has already left the live states, or a scheduled-maintenance event on
/// the instance falls within `event_grace` of `now`.
pub fn unhealthy(
    node: &Node,
    instance: &Instance,
    events: &[ScheduledEvent],
    reason_patterns: &[String],
    now: DateTime<Utc>,
    event_grace: ChronoDuration,
) -> bool {
    if !instance.state.is_live() {
        return true;
    }

    if node.state.down {
        if let Some(reason) = &node.reason {
            if reason_patterns.iter().any(|pattern| reason.contains(pattern.as_str())) {
                return true;
            }
        }
    }

    events
        .iter()
        .filter(|event| event.instance_id == instance.instance_id)
        .any(|event| event.not_before - now <= event_grace)
}

/// True iff `instance`'s node-name tag names no node the scheduler
/// currently reports, AND the instance is older than `grace` measured from
/// its *launch time* — not from when we first noticed the mismatch. This
/// protects a just-launched instance whose tags haven't propagated yet from
/// being killed as an orphan before resume has had a chance to bind it
/// (§4.5, §9 Open Questions: graced by launch time, not first-observed
/// time).
pub fn orphan(
    instance: &Instance,
    known_node_names: &HashSet<String>,
    now: DateTime<Utc>,
    grace: ChronoDuration,
) -> bool {
    let tagged_name = instance.node_name_tag();
    let is_known = tagged_name.map(|name| known_node_names.contains(name)).unwrap_or(false);
    if is_known {
        return false;
    }
    instance.age(now) > grace
}

/// The action a compute resource of type `capacity-block` should take given
/// its reservation's current lifecycle (§4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapacityBlockAction {
    DisableNodes,
    EnableNodes,
    DrainAndDisable,
}

pub fn classify_capacity_block(lifecycle: CapacityReservationLifecycle) -> CapacityBlockAction {
    match lifecycle {
        CapacityReservationLifecycle::Pending => CapacityBlockAction::DisableNodes,
        CapacityReservationLifecycle::Active => CapacityBlockAction::EnableNodes,
        CapacityReservationLifecycle::Expired | CapacityReservationLifecycle::Cancelled => {
            CapacityBlockAction::DrainAndDisable
        }
    }
}

/// The reason string `capacity_block_actions` writes when disabling nodes
/// for a `pending` capacity-block reservation; also what `EnableNodes`
/// checks for before re-admitting a node, so a node DOWN for any other
/// reason is left alone.
pub const CAPACITY_BLOCK_PENDING_REASON: &str = "CapacityReservationPending";
/// The reason string `capacity_block_actions` writes when draining nodes
/// for an expired/cancelled capacity-block reservation.
pub const CAPACITY_BLOCK_EXPIRED_REASON: &str = "CapacityReservationExpired";

/// Turns one compute resource's capacity-block lifecycle outcome into the
/// per-node actions §4.6 step 5 requires ("handle capacity-block
/// transitions"), given every node currently belonging to that compute
/// resource (§4.5 "Capacity-block state machine").
pub fn capacity_block_actions(action: CapacityBlockAction, nodes: &[&Node]) -> Vec<Action> {
    match action {
        CapacityBlockAction::DisableNodes => nodes
            .iter()
            .filter(|n| !n.state.down)
            .map(|n| Action::MarkDown {
                node_name: n.name.as_str().to_string(),
                reason: CAPACITY_BLOCK_PENDING_REASON.to_string(),
            })
            .collect(),
        CapacityBlockAction::EnableNodes => nodes
            .iter()
            .filter(|n| {
                n.state.down
                    && n.reason.as_deref().map(|r| r.contains(CAPACITY_BLOCK_PENDING_REASON)).unwrap_or(false)
            })
            .map(|n| Action::PowerUp { node_name: n.name.as_str().to_string() })
            .collect(),
        CapacityBlockAction::DrainAndDisable => nodes
            .iter()
            .filter(|n| !n.state.drain && !n.state.down)
            .map(|n| Action::Drain {
                node_name: n.name.as_str().to_string(),
                reason: CAPACITY_BLOCK_EXPIRED_REASON.to_string(),
            })
            .collect(),
    }
}

/// Evaluates the tie-break rules in §4.6 for one bound (node, instance)
/// pair and returns the single action clustermgtd should take, if any.
///
/// Precedence, matching "Tie-breaks" in §4.6:
/// 1. Powered-down wins over unhealthy (terminate-then-reset is redundant
///    work once powered-down already implies cleanup).
/// 2. A static node whose instance is terminated and which is DOWN is
///    reset, not just marked down again, so resume relaunches it.
/// 3. An unhealthy static node's instance is terminated.
/// 4. A powered-down dynamic node's instance is terminated.
/// 5. Steady states produce `Noop`.
#[allow(clippy::too_many_arguments)]
pub fn evaluate_bound_pair(
    node: &Node,
    instance: &Instance,
    events: &[ScheduledEvent],
    reason_patterns: &[String],
    now: DateTime<Utc>,
    event_grace: ChronoDuration,
    bootstrap_timeout: ChronoDuration,
) -> Action {
    if node.state.powered_down {
        return Action::Terminate { instance_id: instance.instance_id.clone() };
    }

    let is_unhealthy = unhealthy(node, instance, events, reason_patterns, now, event_grace);
    let instance_terminated = !instance.state.is_live();

    if node.is_static() {
        if instance_terminated && node.state.down {
            return Action::Reset { node_name: node.name.as_str().to_string() };
        }
        if is_unhealthy {
            return Action::Terminate { instance_id: instance.instance_id.clone() };
        }
    } else if is_unhealthy {
        return Action::Terminate { instance_id: instance.instance_id.clone() };
    }

    if bootstrap_failed(node, instance, now, bootstrap_timeout) {
        return Action::MarkDown {
            node_name: node.name.as_str().to_string(),
            reason: "bootstrap-timeout".to_string(),
        };
    }

    Action::Noop
}

#[cfg(test)]
mod tests {
    use super::*;
    use pcluster_core::{NodeName, NodeStateFlags};
    use std::collections::HashMap;

    fn instance_at(age_secs: i64, state: InstanceState) -> Instance {
        Instance {
            instance_id: "i-1".to_string(),
            private_ip: Some("10.0.0.1".to_string()),
            private_dns: None,
            instance_type: "c5.xlarge".to_string(),
            launch_time: Utc::now() - ChronoDuration::seconds(age_secs),
            state,
            tags: HashMap::new(),
        }
    }

    fn node_with_flags(flags: NodeStateFlags) -> Node {
        Node {
            name: NodeName::parse("queue1-dy-cr1-1").unwrap(),
            state: flags,
            reason: None,
            last_busy: None,
            node_addr: Some("10.0.0.1".to_string()),
            node_hostname: Some("ip-10-0-0-1".to_string()),
            reservation: None,
        }
    }

    #[test]
    fn bootstrap_failed_requires_inactive_node_and_stale_instance() {
        let now = Utc::now();
        let instance = instance_at(7200, InstanceState::Running);
        let mut node = node_with_flags(NodeStateFlags::default());
        assert!(bootstrap_failed(&node, &instance, now, ChronoDuration::seconds(1800)));

        node.state.idle = true;
        assert!(!bootstrap_failed(&node, &instance, now, ChronoDuration::seconds(1800)));
    }

    #[test]
    fn unhealthy_matches_configured_reason_pattern() {
        let now = Utc::now();
        let instance = instance_at(100, InstanceState::Running);
        let mut node = node_with_flags(NodeStateFlags { down: true, ..Default::default() });
        node.reason = Some("Kill task failed, node boot failure".to_string());
        let patterns = vec!["boot failure".to_string()];
        assert!(unhealthy(&node, &instance, &[], &patterns, now, ChronoDuration::seconds(120)));
    }

    #[test]
    fn unhealthy_when_instance_already_terminated() {
        let now = Utc::now();
        let instance = instance_at(100, InstanceState::Terminated);
        let node = node_with_flags(NodeStateFlags::default());
        assert!(unhealthy(&node, &instance, &[], &[], now, ChronoDuration::seconds(120)));
    }

    #[test]
    fn unhealthy_when_maintenance_event_imminent() {
        let now = Utc::now();
        let instance = instance_at(100, InstanceState::Running);
        let node = node_with_flags(NodeStateFlags::default());
        let events = vec![ScheduledEvent {
            instance_id: "i-1".to_string(),
            code: "instance-retirement".to_string(),
            not_before: now + ChronoDuration::seconds(30),
        }];
        assert!(unhealthy(&node, &instance, &events, &[], now, ChronoDuration::seconds(120)));
    }

    #[test]
    fn orphan_respects_launch_time_grace_regardless_of_tag_visibility() {
        let now = Utc::now();
        let known: HashSet<String> = HashSet::new();
        let fresh = instance_at(30, InstanceState::Running);
        assert!(!orphan(&fresh, &known, now, ChronoDuration::seconds(120)));

        let stale = instance_at(300, InstanceState::Running);
        assert!(orphan(&stale, &known, now, ChronoDuration::seconds(120)));
    }

    #[test]
    fn orphan_false_when_tag_names_known_node() {
        let now = Utc::now();
        let mut instance = instance_at(300, InstanceState::Running);
        instance.tags.insert("Name".to_string(), "queue1-dy-cr1-1".to_string());
        let mut known = HashSet::new();
        known.insert("queue1-dy-cr1-1".to_string());
        assert!(!orphan(&instance, &known, now, ChronoDuration::seconds(120)));
    }

    #[test]
    fn powered_down_wins_over_unhealthy() {
        let now = Utc::now();
        let instance = instance_at(5000, InstanceState::Running);
        let mut node = node_with_flags(NodeStateFlags {
            powered_down: true,
            down: true,
            ..Default::default()
        });
        node.reason = Some("some failure".to_string());
        let action = evaluate_bound_pair(
            &node,
            &instance,
            &[],
            &["some failure".to_string()],
            now,
            ChronoDuration::seconds(120),
            ChronoDuration::seconds(1800),
        );
        assert_eq!(action, Action::Terminate { instance_id: "i-1".to_string() });
    }

    #[test]
    fn static_terminated_and_down_is_reset_not_markdown() {
        let now = Utc::now();
        let instance = instance_at(100, InstanceState::Terminated);
        let mut node = node_with_flags(NodeStateFlags { down: true, ..Default::default() });
        node.name = NodeName::parse("queue1-st-cr1-1").unwrap();
        let action = evaluate_bound_pair(
            &node,
            &instance,
            &[],
            &[],
            now,
            ChronoDuration::seconds(120),
            ChronoDuration::seconds(1800),
        );
        assert_eq!(action, Action::Reset { node_name: "queue1-st-cr1-1".to_string() });
    }

    #[test]
    fn steady_idle_node_with_healthy_instance_is_noop() {
        let now = Utc::now();
        let instance = instance_at(100, InstanceState::Running);
        let node = node_with_flags(NodeStateFlags { idle: true, ..Default::default() });
        let action = evaluate_bound_pair(
            &node,
            &instance,
            &[],
            &[],
            now,
            ChronoDuration::seconds(120),
            ChronoDuration::seconds(1800),
        );
        assert_eq!(action, Action::Noop);
    }

    #[test]
    fn capacity_block_disable_marks_down_undown_nodes_only() {
        let mut down_node = node_with_flags(NodeStateFlags { down: true, ..Default::default() });
        down_node.name = NodeName::parse("queue1-dy-cr1-1").unwrap();
        let mut idle_node = node_with_flags(NodeStateFlags { idle: true, ..Default::default() });
        idle_node.name = NodeName::parse("queue1-dy-cr1-2").unwrap();

        let actions = capacity_block_actions(CapacityBlockAction::DisableNodes, &[&down_node, &idle_node]);
        assert_eq!(
            actions,
            vec![Action::MarkDown {
                node_name: "queue1-dy-cr1-2".to_string(),
                reason: CAPACITY_BLOCK_PENDING_REASON.to_string(),
            }]
        );
    }

    #[test]
    fn capacity_block_enable_only_powers_up_nodes_disabled_for_that_reason() {
        let mut pending_down = node_with_flags(NodeStateFlags { down: true, ..Default::default() });
        pending_down.name = NodeName::parse("queue1-dy-cr1-1").unwrap();
        pending_down.reason = Some(CAPACITY_BLOCK_PENDING_REASON.to_string());

        let mut other_down = node_with_flags(NodeStateFlags { down: true, ..Default::default() });
        other_down.name = NodeName::parse("queue1-dy-cr1-2").unwrap();
        other_down.reason = Some("unrelated failure".to_string());

        let actions =
            capacity_block_actions(CapacityBlockAction::EnableNodes, &[&pending_down, &other_down]);
        assert_eq!(actions, vec![Action::PowerUp { node_name: "queue1-dy-cr1-1".to_string() }]);
    }

    #[test]
    fn capacity_block_drain_and_disable_drains_nodes_not_already_draining_or_down() {
        let mut active_node = node_with_flags(NodeStateFlags { idle: true, ..Default::default() });
        active_node.name = NodeName::parse("queue1-dy-cr1-1").unwrap();
        let mut draining_node = node_with_flags(NodeStateFlags { drain: true, ..Default::default() });
        draining_node.name = NodeName::parse("queue1-dy-cr1-2").unwrap();

        let actions = capacity_block_actions(
            CapacityBlockAction::DrainAndDisable,
            &[&active_node, &draining_node],
        );
        assert_eq!(
            actions,
            vec![Action::Drain {
                node_name: "queue1-dy-cr1-1".to_string(),
                reason: CAPACITY_BLOCK_EXPIRED_REASON.to_string(),
            }]
        );
    }

    #[test]
    fn capacity_block_lifecycle_maps_to_expected_actions() {
        assert_eq!(
            classify_capacity_block(CapacityReservationLifecycle::Pending),
            CapacityBlockAction::DisableNodes
        );
        assert_eq!(
            classify_capacity_block(CapacityReservationLifecycle::Active),
            CapacityBlockAction::EnableNodes
        );
        assert_eq!(
            classify_capacity_block(CapacityReservationLifecycle::Expired),
            CapacityBlockAction::DrainAndDisable
        );
        assert_eq!(
            classify_capacity_block(CapacityReservationLifecycle::Cancelled),
            CapacityBlockAction::DrainAndDisable
        );
    }
}
