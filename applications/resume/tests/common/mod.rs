//! Fakes shared by the resume scenario tests: a `CloudApi` that records every
//! call instead of touching AWS, and a fake `scontrol` executable that lets
//! `SlurmScheduler` run its real subprocess code path against a script
//! instead of the real binary.

use std::collections::{HashMap, VecDeque};
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use cloud_traits::{
    CapacityReservationState, CloudApi, DescribeFilter, DnsChange, LaunchFleetOutcome,
    LaunchFleetRequest, Result as CloudResult, ScheduledEvent,
};
use pcluster_core::Instance;

#[derive(Default)]
pub struct FakeCloudApi {
    pub launch_outcomes: Mutex<VecDeque<LaunchFleetOutcome>>,
    pub describe_response: Mutex<Vec<Instance>>,
    pub tag_calls: Mutex<Vec<(String, HashMap<String, String>)>>,
    pub terminate_calls: Mutex<Vec<Vec<String>>>,
    pub dns_calls: Mutex<Vec<(String, Vec<DnsChange>)>>,
}

impl FakeCloudApi {
    pub fn push_launch_outcome(&self, outcome: LaunchFleetOutcome) {
        self.launch_outcomes.lock().unwrap().push_back(outcome);
    }

    pub fn terminated_ids(&self) -> Vec<String> {
        self.terminate_calls.lock().unwrap().iter().flatten().cloned().collect()
    }
}

#[async_trait]
impl CloudApi for FakeCloudApi {
    async fn launch_fleet(&self, _request: LaunchFleetRequest) -> CloudResult<LaunchFleetOutcome> {
        Ok(self.launch_outcomes.lock().unwrap().pop_front().unwrap_or_default())
    }

    async fn terminate(&self, instance_ids: &[String]) -> CloudResult<()> {
        self.terminate_calls.lock().unwrap().push(instance_ids.to_vec());
        Ok(())
    }

    async fn tag_instance(
        &self,
        instance_id: &str,
        tags: &HashMap<String, String>,
    ) -> CloudResult<()> {
        self.tag_calls.lock().unwrap().push((instance_id.to_string(), tags.clone()));
        Ok(())
    }

    async fn describe_instances_by_filter(
        &self,
        _filters: &[DescribeFilter],
    ) -> CloudResult<Vec<Instance>> {
        Ok(self.describe_response.lock().unwrap().clone())
    }

    async fn describe_capacity_reservations(
        &self,
        _ids: &[String],
    ) -> CloudResult<Vec<CapacityReservationState>> {
        Ok(Vec::new())
    }

    async fn describe_scheduled_events(
        &self,
        _instance_ids: &[String],
    ) -> CloudResult<Vec<ScheduledEvent>> {
        Ok(Vec::new())
    }

    async fn apply_dns_changes(&self, zone_id: &str, changes: &[DnsChange]) -> CloudResult<()> {
        self.dns_calls.lock().unwrap().push((zone_id.to_string(), changes.to_vec()));
        Ok(())
    }
}

/// Writes a fake `scontrol` at `dir/scontrol`: `show nodes` dumps
/// `nodes.txt` (seeded with `nodes_output`, rewritable by the test to
/// simulate a later iteration's state), everything else just gets appended
/// to `calls.log` and succeeds. Returns `(scontrol_path, nodes_path,
/// calls_log_path)`.
pub fn write_fake_scontrol(dir: &Path, nodes_output: &str) -> (PathBuf, PathBuf, PathBuf) {
    let nodes_path = dir.join("nodes.txt");
    let calls_log = dir.join("calls.log");
    let script_path = dir.join("scontrol");

    std::fs::write(&nodes_path, nodes_output).unwrap();
    std::fs::write(&calls_log, "").unwrap();

    let mut script = std::fs::File::create(&script_path).unwrap();
    writeln!(script, "#!/bin/sh").unwrap();
    writeln!(script, "DIR=\"$(CDPATH= cd -- \"$(dirname -- \"$0\")\" && pwd)\"").unwrap();
    writeln!(script, "echo \"$@\" >> \"$DIR/calls.log\"").unwrap();
    writeln!(script, "if [ \"$1\" = \"show\" ] && [ \"$2\" = \"nodes\" ]; then").unwrap();
    writeln!(script, "  cat \"$DIR/nodes.txt\"").unwrap();
    writeln!(script, "fi").unwrap();
    writeln!(script, "exit 0").unwrap();
    drop(script);

    let mut perms = std::fs::metadata(&script_path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&script_path, perms).unwrap();

    (script_path, nodes_path, calls_log)
}
