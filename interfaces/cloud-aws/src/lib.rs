//! AWS implementation of `cloud_traits::CloudApi`.
//!
//! This is the only crate in the workspace that imports an AWS SDK —
//! everything upstream of it (health-policy, resume, suspend, clustermgtd)
//! programs against the trait instead.

pub mod ec2;
pub mod fleet_status_store;
pub mod overrides;
pub mod retry;
pub mod route53;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_types::region::Region;
use cloud_traits::{
    CapacityReservationState, CloudApi, DescribeFilter, DnsChange, LaunchFleetOutcome,
    LaunchFleetRequest, Result, ScheduledEvent,
};
use pcluster_core::Instance;

/// Concrete AWS-backed `CloudApi`. Holds one EC2 client and one Route 53
/// client; both are cheap to clone (the SDK clients are `Arc`-backed
/// internally).
#[derive(Clone)]
pub struct AwsCloudApi {
    ec2: aws_sdk_ec2::Client,
    route53: aws_sdk_route53::Client,
    retry_policy: retry::RetryPolicy,
}

impl AwsCloudApi {
    pub async fn from_region(region: impl Into<String>) -> Self {
        let config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.into()))
            .load()
            .await;
        Self {
            ec2: aws_sdk_ec2::Client::new(&config),
            route53: aws_sdk_route53::Client::new(&config),
            retry_policy: retry::RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, policy: retry::RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }
}

#[async_trait]
impl CloudApi for AwsCloudApi {
    async fn launch_fleet(&self, request: LaunchFleetRequest) -> Result<LaunchFleetOutcome> {
        ec2::launch_fleet(&self.ec2, &self.retry_policy, request).await
    }

    async fn terminate(&self, instance_ids: &[String]) -> Result<()> {
        ec2::terminate(&self.ec2, &self.retry_policy, instance_ids).await
    }

    async fn tag_instance(
        &self,
        instance_id: &str,
        tags: &std::collections::HashMap<String, String>,
    ) -> Result<()> {
        ec2::tag_instance(&self.ec2, &self.retry_policy, instance_id, tags).await
    }

    async fn describe_instances_by_filter(
        &self,
        filters: &[DescribeFilter],
    ) -> Result<Vec<Instance>> {
        ec2::describe_instances_by_filter(&self.ec2, &self.retry_policy, filters).await
    }

    async fn describe_capacity_reservations(
        &self,
        ids: &[String],
    ) -> Result<Vec<CapacityReservationState>> {
        ec2::describe_capacity_reservations(&self.ec2, &self.retry_policy, ids).await
    }

    async fn describe_scheduled_events(
        &self,
        instance_ids: &[String],
    ) -> Result<Vec<ScheduledEvent>> {
        ec2::describe_scheduled_events(&self.ec2, &self.retry_policy, instance_ids).await
    }

    async fn apply_dns_changes(&self, zone_id: &str, changes: &[DnsChange]) -> Result<()> {
        route53::apply_dns_changes(&self.route53, &self.retry_policy, zone_id, changes).await
    }
}
