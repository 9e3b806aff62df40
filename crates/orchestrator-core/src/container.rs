//! Thin port over the external container orchestrator (C4). Talks to ECS
//! for task lifecycle and EC2 for subnet discovery; the Capacity Manager is
//! the only caller.

use aws_sdk_ec2::Client as Ec2Client;
use aws_sdk_ecs::types::AssignPublicIp;
use aws_sdk_ecs::Client as EcsClient;
use rand::seq::SliceRandom;

use crate::{Error, Result};

/// The manager's own lifecycle model for a tracked worker, after mapping
/// from the container runtime's native status strings (spec §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappedStatus {
    Pending,
    Running,
    Stopped,
    /// An unrecognized status string: logged, tracked status left unchanged.
    Unknown,
}

/// Map an ECS task's `lastStatus` into the Capacity Manager's lifecycle
/// model per the table in spec §4.4.
pub fn map_status(status: &str) -> MappedStatus {
    match status {
        "PROVISIONING" | "PENDING" | "ACTIVATING" => MappedStatus::Pending,
        "RUNNING" => MappedStatus::Running,
        "DEACTIVATING" | "STOPPING" | "STOPPED" | "DEPROVISIONING" | "DEPROVISIONED" => {
            MappedStatus::Stopped
        }
        _ => MappedStatus::Unknown,
    }
}

pub struct DescribedTask {
    pub task_id: String,
    pub status: Option<String>,
    pub missing: bool,
}

pub struct RunTaskRequest<'a> {
    pub cluster: &'a str,
    pub task_definition: &'a str,
    pub subnet: &'a str,
    pub security_group: &'a str,
    pub assign_public_ip: bool,
}

pub struct ContainerDriver {
    ecs: EcsClient,
    ec2: Ec2Client,
}

impl ContainerDriver {
    pub fn new(ecs: EcsClient, ec2: Ec2Client) -> Self {
        Self { ecs, ec2 }
    }

    /// Launch one task; on success returns the started task ids (expected
    /// length 1). Failure leaves no side effect visible to the caller.
    pub async fn run_task(&self, request: RunTaskRequest<'_>) -> Result<Vec<String>> {
        let assign_public_ip = if request.assign_public_ip {
            AssignPublicIp::Enabled
        } else {
            AssignPublicIp::Disabled
        };

        let network_config = aws_sdk_ecs::types::NetworkConfiguration::builder()
            .awsvpc_configuration(
                aws_sdk_ecs::types::AwsVpcConfiguration::builder()
                    .subnets(request.subnet)
                    .security_groups(request.security_group)
                    .assign_public_ip(assign_public_ip)
                    .build()
                    .map_err(|e| Error::transient(format!("invalid network config: {}", e)))?,
            )
            .build();

        let output = self
            .ecs
            .run_task()
            .cluster(request.cluster)
            .task_definition(request.task_definition)
            .launch_type(aws_sdk_ecs::types::LaunchType::Fargate)
            .network_configuration(network_config)
            .send()
            .await
            .map_err(|e| Error::transient(format!("run_task failed: {}", e)))?;

        if let Some(failure) = output.failures().first() {
            return Err(Error::transient(format!(
                "run_task reported a failure: {}",
                failure.reason().unwrap_or("unknown reason")
            )));
        }

        let task_ids = output
            .tasks()
            .iter()
            .filter_map(|t| t.task_arn().map(|s| s.to_string()))
            .collect();

        Ok(task_ids)
    }

    /// Describe a chunk of task ids (caller chunks to ≤100 per spec §4.6.1).
    pub async fn describe_tasks(
        &self,
        cluster: &str,
        task_ids: &[String],
    ) -> Result<Vec<DescribedTask>> {
        if task_ids.is_empty() {
            return Ok(Vec::new());
        }

        let output = self
            .ecs
            .describe_tasks()
            .cluster(cluster)
            .set_tasks(Some(task_ids.to_vec()))
            .send()
            .await
            .map_err(|e| Error::transient(format!("describe_tasks failed: {}", e)))?;

        let mut by_id: std::collections::HashMap<String, String> = std::collections::HashMap::new();
        for task in output.tasks() {
            if let (Some(arn), Some(status)) = (task.task_arn(), task.last_status()) {
                by_id.insert(arn.to_string(), status.to_string());
            }
        }

        let missing: std::collections::HashSet<String> = output
            .failures()
            .iter()
            .filter_map(|f| f.arn().map(|s| s.to_string()))
            .collect();

        Ok(task_ids
            .iter()
            .map(|id| {
                let status = by_id.get(id).cloned();
                let is_missing = missing.contains(id) || status.is_none();
                DescribedTask {
                    task_id: id.clone(),
                    status,
                    missing: is_missing,
                }
            })
            .collect())
    }

    /// Pick a random subnet flagged public in the given VPC.
    pub async fn pick_public_subnet(&self, vpc_id: &str) -> Result<String> {
        let output = self
            .ec2
            .describe_subnets()
            .filters(
                aws_sdk_ec2::types::Filter::builder()
                    .name("vpc-id")
                    .values(vpc_id)
                    .build(),
            )
            .filters(
                aws_sdk_ec2::types::Filter::builder()
                    .name("map-public-ip-on-launch")
                    .values("true")
                    .build(),
            )
            .send()
            .await
            .map_err(|e| Error::transient(format!("describe_subnets failed: {}", e)))?;

        let subnet_ids: Vec<String> = output
            .subnets()
            .iter()
            .filter_map(|s| s.subnet_id().map(|s| s.to_string()))
            .collect();

        subnet_ids
            .choose(&mut rand::thread_rng())
            .cloned()
            .ok_or_else(|| Error::transient(format!("no public subnets found in vpc {}", vpc_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provisioning_states_map_to_pending() {
        for s in ["PROVISIONING", "PENDING", "ACTIVATING"] {
            assert_eq!(map_status(s), MappedStatus::Pending);
        }
    }

    #[test]
    fn running_maps_to_running() {
        assert_eq!(map_status("RUNNING"), MappedStatus::Running);
    }

    #[test]
    fn teardown_states_map_to_stopped() {
        for s in [
            "DEACTIVATING",
            "STOPPING",
            "STOPPED",
            "DEPROVISIONING",
            "DEPROVISIONED",
        ] {
            assert_eq!(map_status(s), MappedStatus::Stopped);
        }
    }

    #[test]
    fn unrecognized_status_is_unknown_not_an_error() {
        assert_eq!(map_status("SOMETHING_NEW"), MappedStatus::Unknown);
    }
}
