//! End-to-end coverage for the ResumeProgram pipeline (§4.3), driving
//! `resume::run` against `FakeCloudApi` and a real `SlurmScheduler` pointed
//! at a fake `scontrol` script.

mod common;

use std::collections::HashMap;

use chrono::Utc;
use cloud_aws::overrides::OverridesFile;
use cloud_traits::{CapacityError, CapacityErrorKind, LaunchFleetOutcome};
use common::{write_fake_scontrol, FakeCloudApi};
use pcluster_core::{Config, FleetConfig, Instance, InstanceState, TAG_NODE_NAME};
use pcluster_scheduler::{expand_hostlist, SlurmScheduler};
use resume::{cooldown::CooldownCache, pipeline::ResumeContext};

fn fleet_config(queue: &str, cr: &str) -> FleetConfig {
    let json = format!(
        r#"{{"{queue}": {{"{cr}": {{
            "api": "run-instances",
            "capacity_type": "on-demand",
            "instances": [{{"instance_type": "c5.xlarge"}}]
        }}}}}}"#
    );
    serde_json::from_str(&json).unwrap()
}

fn running_instance(id: &str, ip: &str, dns: &str) -> Instance {
    Instance {
        instance_id: id.to_string(),
        private_ip: Some(ip.to_string()),
        private_dns: Some(dns.to_string()),
        instance_type: "c5.xlarge".to_string(),
        launch_time: Utc::now(),
        state: InstanceState::Running,
        tags: HashMap::new(),
    }
}

#[tokio::test]
async fn scenario_1_full_capacity_binds_tags_and_upserts_dns_for_every_node() {
    let dir = tempfile::tempdir().unwrap();
    let (scontrol_path, _nodes_path, calls_log) = write_fake_scontrol(dir.path(), "");
    let scheduler = SlurmScheduler::new(scontrol_path);

    let cloud = FakeCloudApi::default();
    cloud.push_launch_outcome(LaunchFleetOutcome {
        assigned: vec![
            running_instance("i-1", "10.0.0.1", "ip-10-0-0-1"),
            running_instance("i-2", "10.0.0.2", "ip-10-0-0-2"),
            running_instance("i-3", "10.0.0.3", "ip-10-0-0-3"),
        ],
        errors: Vec::new(),
    });

    let fleet_config = fleet_config("queue1", "cr1");
    let run_overrides = OverridesFile::default();
    let create_overrides = OverridesFile::default();
    let config = Config::default();

    let ctx = ResumeContext {
        cloud: &cloud,
        scheduler: &scheduler,
        fleet_config: &fleet_config,
        run_instances_overrides: &run_overrides,
        create_fleet_overrides: &create_overrides,
        config: &config,
        cluster_name: "test-cluster",
    };

    let node_names = expand_hostlist("queue1-dy-cr1-[1-3]");
    let cooldown = CooldownCache::default();

    let (report, newly_cooling_down) =
        resume::run(&ctx, &node_names, &cooldown, Utc::now()).await.unwrap();

    assert!(report.all_bound());
    assert_eq!(report.results.len(), 3);
    assert_eq!(report.dns_upserts.len(), 3);
    assert!(newly_cooling_down.is_empty());

    let tag_calls = cloud.tag_calls.lock().unwrap();
    assert_eq!(tag_calls.len(), 3);
    for (_, tags) in tag_calls.iter() {
        assert!(tags.get(TAG_NODE_NAME).is_some());
    }
    drop(tag_calls);

    let calls = std::fs::read_to_string(&calls_log).unwrap();
    assert_eq!(calls.matches("NodeAddr=").count(), 3);
    assert_eq!(calls.matches("NodeHostName=").count(), 3);
}

#[tokio::test]
async fn scenario_2_partial_ice_binds_survivors_and_marks_the_rest_down_on_cooldown() {
    let dir = tempfile::tempdir().unwrap();
    let (scontrol_path, _nodes_path, calls_log) = write_fake_scontrol(dir.path(), "");
    let scheduler = SlurmScheduler::new(scontrol_path);

    let cloud = FakeCloudApi::default();
    cloud.push_launch_outcome(LaunchFleetOutcome {
        assigned: vec![running_instance("i-1", "10.0.0.1", "ip-10-0-0-1")],
        errors: vec![CapacityError {
            compute_resource: "cr1".to_string(),
            kind: CapacityErrorKind::InsufficientCapacity,
            code: "InsufficientInstanceCapacity".to_string(),
            message: "We currently do not have sufficient capacity".to_string(),
        }],
    });

    let fleet_config = fleet_config("queue1", "cr1");
    let run_overrides = OverridesFile::default();
    let create_overrides = OverridesFile::default();
    let config = Config::default();

    let ctx = ResumeContext {
        cloud: &cloud,
        scheduler: &scheduler,
        fleet_config: &fleet_config,
        run_instances_overrides: &run_overrides,
        create_fleet_overrides: &create_overrides,
        config: &config,
        cluster_name: "test-cluster",
    };

    let node_names = expand_hostlist("queue1-dy-cr1-[1-3]");
    let cooldown = CooldownCache::default();

    let (report, newly_cooling_down) =
        resume::run(&ctx, &node_names, &cooldown, Utc::now()).await.unwrap();

    assert!(!report.all_bound());
    assert_eq!(report.dns_upserts.len(), 1);
    let marked_down: Vec<_> = report
        .results
        .iter()
        .filter(|r| matches!(r.outcome, resume::pipeline::NodeOutcome::MarkedDown { .. }))
        .collect();
    assert_eq!(marked_down.len(), 2);
    for result in &marked_down {
        if let resume::pipeline::NodeOutcome::MarkedDown { reason } = &result.outcome {
            assert!(reason.contains("InsufficientInstanceCapacity"));
        }
    }

    assert_eq!(newly_cooling_down, vec![("queue1".to_string(), "cr1".to_string())]);
    assert_eq!(cloud.tag_calls.lock().unwrap().len(), 1);

    let calls = std::fs::read_to_string(&calls_log).unwrap();
    assert_eq!(calls.matches("State=DOWN").count(), 2);
}
