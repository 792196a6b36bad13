//! The ResumeProgram pipeline (§4.3): expand hostlist -> group by (queue,
//! compute-resource) -> look up fleet config -> launch in batches -> bind
//! -> DNS.
//!
//! Classification of launch shortfalls follows the same capacity/permanent
//! split `health-policy` draws for clustermgtd, applied here to per-node
//! launch outcomes instead of per-node health.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use cloud_aws::overrides::OverridesFile;
use cloud_traits::{CapacityErrorKind, CloudApi, DescribeFilter, LaunchFleetRequest};
use pcluster_core::{Api, Config, FleetConfig, Instance, NodeName, TAG_NODE_NAME};
use pcluster_scheduler::SlurmScheduler;
use tracing::{info, warn};

use crate::error::Result;

/// Per-node outcome of one resume invocation (§8 "Resume is idempotent",
/// §4.3 step 7).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeOutcome {
    Bound,
    MarkedDown { reason: String },
}

#[derive(Debug, Clone)]
pub struct NodeResult {
    pub node_name: String,
    pub outcome: NodeOutcome,
}

#[derive(Debug, Default)]
pub struct ResumeReport {
    pub results: Vec<NodeResult>,
    /// `(node_name, private_ip)` pairs bound this invocation, handed to the
    /// caller for a single batched DNS upsert across every group (§4.3
    /// step 6, §6 "DNS batch limit").
    pub dns_upserts: Vec<(String, String)>,
}

impl ResumeReport {
    /// Exit code contract (§4.3 step 7, §6): 0 iff every requested node
    /// bound.
    pub fn all_bound(&self) -> bool {
        self.results.iter().all(|r| r.outcome == NodeOutcome::Bound)
    }

    fn merge(&mut self, other: GroupOutcome) {
        self.results.extend(other.results);
        self.dns_upserts.extend(other.dns_upserts);
    }
}

/// Groups an already hostlist-expanded list of node names by (queue,
/// compute-resource) (§4.3 step 1). A node name the scheduler convention
/// can't parse is dropped with a warning rather than failing the whole
/// invocation — the same posture `parser::parse_node_listing` takes.
pub fn group_by_queue_cr(node_names: &[String]) -> BTreeMap<(String, String), Vec<NodeName>> {
    let mut groups: BTreeMap<(String, String), Vec<NodeName>> = BTreeMap::new();
    for raw in node_names {
        match NodeName::parse(raw) {
            Ok(name) => {
                groups.entry((name.queue.clone(), name.compute_resource.clone())).or_default().push(name);
            }
            Err(err) => {
                warn!(node = %raw, error = %err, "skipping unparseable node name in resume request");
            }
        }
    }
    groups
}

pub struct ResumeContext<'a> {
    pub cloud: &'a dyn CloudApi,
    pub scheduler: &'a SlurmScheduler,
    pub fleet_config: &'a FleetConfig,
    pub run_instances_overrides: &'a OverridesFile,
    pub create_fleet_overrides: &'a OverridesFile,
    pub config: &'a Config,
    pub cluster_name: &'a str,
}

struct GroupOutcome {
    results: Vec<NodeResult>,
    dns_upserts: Vec<(String, String)>,
    /// Set when this group's shortfall was an ICE, so the caller marks the
    /// compute resource on cooldown (§4.3 step 5).
    hit_insufficient_capacity: bool,
}

/// Runs the full pipeline for every group, up to `worker_pool_size`
/// concurrently (§4.3 step 3, §5). Cooldown reads happen once up front and
/// writes happen once at the end so concurrent groups never race the same
/// cache file.
pub async fn run(
    ctx: &ResumeContext<'_>,
    node_names: &[String],
    cooldown: &crate::cooldown::CooldownCache,
    now: DateTime<Utc>,
) -> Result<(ResumeReport, Vec<(String, String)>)> {
    use futures::stream::{self, StreamExt};

    let groups = group_by_queue_cr(node_names);
    let fan_out = ctx.config.worker_pool_size.max(1);

    let outcomes: Vec<Result<((String, String), GroupOutcome)>> = stream::iter(groups.into_iter())
        .map(|((queue, cr), names)| {
            let queue = queue.clone();
            let cr = cr.clone();
            async move {
                let outcome = process_group(ctx, &queue, &cr, names, cooldown, now).await?;
                Ok(((queue, cr), outcome))
            }
        })
        .buffer_unordered(fan_out)
        .collect()
        .await;

    let mut report = ResumeReport::default();
    let mut newly_cooling_down = Vec::new();
    for outcome in outcomes {
        let ((queue, cr), group_outcome) = outcome?;
        if group_outcome.hit_insufficient_capacity {
            newly_cooling_down.push((queue, cr));
        }
        report.merge(group_outcome);
    }

    Ok((report, newly_cooling_down))
}

async fn process_group(
    ctx: &ResumeContext<'_>,
    queue: &str,
    compute_resource: &str,
    node_names: Vec<NodeName>,
    cooldown: &crate::cooldown::CooldownCache,
    now: DateTime<Utc>,
) -> Result<GroupOutcome> {
    let Some(cr_config) = ctx.fleet_config.lookup(queue, compute_resource) else {
        warn!(queue, compute_resource, "no fleet-config entry; marking group down");
        let mut results = Vec::new();
        for name in &node_names {
            let reason = format!("no fleet-config entry for queue={queue} compute_resource={compute_resource}");
            let _ = ctx.scheduler.mark_down(name.as_str(), &reason).await;
            results.push(NodeResult { node_name: name.as_str().to_string(), outcome: NodeOutcome::MarkedDown { reason } });
        }
        return Ok(GroupOutcome { results, dns_upserts: Vec::new(), hit_insufficient_capacity: false });
    };

    if cooldown.is_on_cooldown(queue, compute_resource, now) {
        info!(queue, compute_resource, "compute resource on ICE cooldown; skipping launch");
        let mut results = Vec::new();
        for name in &node_names {
            let reason = "(Code:InsufficientInstanceCapacity) compute resource on cooldown".to_string();
            let _ = ctx.scheduler.mark_down(name.as_str(), &reason).await;
            results.push(NodeResult { node_name: name.as_str().to_string(), outcome: NodeOutcome::MarkedDown { reason } });
        }
        return Ok(GroupOutcome { results, dns_upserts: Vec::new(), hit_insufficient_capacity: false });
    }

    let overrides = match cr_config.api {
        Api::RunInstances => ctx.run_instances_overrides.for_group(queue, compute_resource),
        Api::CreateFleet => ctx.create_fleet_overrides.for_group(queue, compute_resource),
    };

    let instance_types: Vec<String> = cr_config.instances.iter().map(|i| i.instance_type.clone()).collect();
    let batch_size = ctx.config.launch_max_batch_size.max(1) as usize;

    let mut results = Vec::new();
    let mut dns_upserts = Vec::new();
    let mut hit_insufficient_capacity = false;

    for batch in node_names.chunks(batch_size) {
        let request = LaunchFleetRequest {
            cluster_name: ctx.cluster_name.to_string(),
            queue: queue.to_string(),
            compute_resource: compute_resource.to_string(),
            api: cr_config.api,
            capacity_type: cr_config.capacity_type,
            instance_types: instance_types.clone(),
            capacity_reservation_id: cr_config.capacity_reservation_id.clone(),
            allocation_strategy: cr_config.allocation_strategy.clone(),
            subnet_ids: cr_config.networking.subnet_ids.clone(),
            count: batch.len() as u32,
            overrides: overrides.clone(),
        };

        let outcome = ctx.cloud.launch_fleet(request).await?;
        let assigned = enrich_with_private_ip(ctx.cloud, outcome.assigned).await?;

        let bound_count = assigned.len().min(batch.len());
        for (name, instance) in batch[..bound_count].iter().zip(assigned.iter()) {
            match bind_one(ctx, name, instance).await? {
                Some(private_ip) => {
                    dns_upserts.push((name.as_str().to_string(), private_ip));
                    results.push(NodeResult { node_name: name.as_str().to_string(), outcome: NodeOutcome::Bound });
                }
                None => {
                    let reason = "binding-failed".to_string();
                    results.push(NodeResult { node_name: name.as_str().to_string(), outcome: NodeOutcome::MarkedDown { reason } });
                }
            }
        }

        let unbound = &batch[bound_count..];
        if !unbound.is_empty() {
            let capacity_error = outcome.errors.iter().find(|e| e.kind == CapacityErrorKind::InsufficientCapacity);
            let (reason, is_capacity) = if let Some(err) = capacity_error {
                (format!("(Code:InsufficientInstanceCapacity){}", err.message), true)
            } else if let Some(err) = outcome.errors.first() {
                (err.code.clone(), false)
            } else {
                ("insufficient-capacity-unspecified".to_string(), false)
            };

            if is_capacity {
                hit_insufficient_capacity = true;
            }

            for name in unbound {
                let _ = ctx.scheduler.mark_down(name.as_str(), &reason).await;
                results.push(NodeResult { node_name: name.as_str().to_string(), outcome: NodeOutcome::MarkedDown { reason: reason.clone() } });
            }
        }
    }

    Ok(GroupOutcome { results, dns_upserts, hit_insufficient_capacity })
}

/// `create-fleet` returns bare instance ids with no private IP (§4.1); a
/// follow-up filtered describe fills it in before binding can proceed.
async fn enrich_with_private_ip(cloud: &dyn CloudApi, instances: Vec<Instance>) -> Result<Vec<Instance>> {
    let missing: Vec<String> = instances
        .iter()
        .filter(|i| i.private_ip.is_none())
        .map(|i| i.instance_id.clone())
        .collect();
    if missing.is_empty() {
        return Ok(instances);
    }

    let filter = DescribeFilter { name: "instance-id".to_string(), values: missing };
    let described = cloud.describe_instances_by_filter(&[filter]).await?;
    let by_id: HashMap<String, Instance> =
        described.into_iter().map(|i| (i.instance_id.clone(), i)).collect();

    Ok(instances
        .into_iter()
        .map(|i| by_id.get(&i.instance_id).cloned().unwrap_or(i))
        .collect())
}

/// Binds one launched instance to its node (§4.3 step 4, §8 "Binding is
/// atomic"). Either both `nodeaddr`/`nodehostname` are written, or neither
/// is — a missing private IP/DNS never produces a half-bound node, and a
/// scheduler-update failure after a successful launch terminates the
/// instance rather than leaking it (§4.3 "Ordering").
async fn bind_one(
    ctx: &ResumeContext<'_>,
    name: &NodeName,
    instance: &Instance,
) -> Result<Option<String>> {
    let (Some(ip), Some(dns)) = (instance.private_ip.as_deref(), instance.private_dns.as_deref()) else {
        warn!(node = %name, instance_id = %instance.instance_id, "instance has no private ip/dns yet; treating as binding failure");
        best_effort_terminate_and_markdown(ctx, name, &instance.instance_id, "binding-failed: no private ip/dns").await;
        return Ok(None);
    };

    match ctx.scheduler.bind_node(name.as_str(), ip, dns).await {
        Ok(()) => {
            let tags = HashMap::from([(TAG_NODE_NAME.to_string(), name.as_str().to_string())]);
            if let Err(err) = ctx.cloud.tag_instance(&instance.instance_id, &tags).await {
                warn!(node = %name, instance_id = %instance.instance_id, error = %err, "failed to tag instance with node name");
            }
            Ok(Some(ip.to_string()))
        }
        Err(err) => {
            warn!(node = %name, instance_id = %instance.instance_id, error = %err, "binding failed after launch");
            best_effort_terminate_and_markdown(
                ctx,
                name,
                &instance.instance_id,
                &format!("binding-failed: {err}"),
            )
            .await;
            Ok(None)
        }
    }
}

async fn best_effort_terminate_and_markdown(
    ctx: &ResumeContext<'_>,
    name: &NodeName,
    instance_id: &str,
    reason: &str,
) {
    if let Err(err) = ctx.cloud.terminate(&[instance_id.to_string()]).await {
        warn!(instance_id, error = %err, "failed to terminate instance after binding failure");
    }
    if let Err(err) = ctx.scheduler.mark_down(name.as_str(), reason).await {
        warn!(node = %name, error = %err, "failed to mark node down after binding failure");
    }
}
