//! Best-effort teardown shared by failed creates and explicit deletes
//!
//! Every step is attempted for every endpoint. Failures are logged and
//! recorded in the [`RollbackReport`], never returned, so one stuck resource
//! cannot keep the rest from being cleaned up.

use crate::endpoint::{Connection, VpnEndpoint};
use crate::poller::{PollOutcome, PollTarget, Poller, is_terminated};
use crate::saga::Compensation;
use serde::Serialize;
use std::collections::BTreeSet;
use std::time::Instant;
use vpcmesh_cloud::{CloudError, CloudGateway, RetryConfig, retry};
use vpcmesh_config::MeshConfig;

/// Outcome of one cleanup action
#[derive(Debug, Clone, Serialize)]
pub struct StepResult {
    pub compensation: String,
    pub resource_id: String,
    pub error: Option<String>,
}

/// What a rollback did
#[derive(Debug, Clone, Default, Serialize)]
pub struct RollbackReport {
    pub succeeded: Vec<StepResult>,
    pub failed: Vec<StepResult>,
    /// Instances still not terminated when the wait gave up
    pub pending_termination: Vec<String>,
    pub duration_ms: u64,
}

impl RollbackReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.pending_termination.is_empty()
    }

    pub fn add_success(&mut self, compensation: Compensation, resource_id: impl Into<String>) {
        self.succeeded.push(StepResult {
            compensation: compensation.name().to_string(),
            resource_id: resource_id.into(),
            error: None,
        });
    }

    pub fn add_failure(
        &mut self,
        compensation: Compensation,
        resource_id: impl Into<String>,
        error: &CloudError,
    ) {
        let resource_id = resource_id.into();
        tracing::warn!(
            step = compensation.name(),
            resource_id = %resource_id,
            error = %error,
            "Rollback step failed"
        );
        self.failed.push(StepResult {
            compensation: compensation.name().to_string(),
            resource_id,
            error: Some(error.to_string()),
        });
    }

    fn record(
        &mut self,
        compensation: Compensation,
        resource_id: &str,
        outcome: vpcmesh_cloud::Result<()>,
    ) {
        match outcome {
            Ok(()) => self.add_success(compensation, resource_id),
            // already gone
            Err(err) if err.is_not_found() => self.add_success(compensation, resource_id),
            Err(err) => self.add_failure(compensation, resource_id, &err),
        }
    }
}

pub struct Rollback<'a> {
    gateway: &'a dyn CloudGateway,
    enabled: BTreeSet<Compensation>,
    terminate_poller: Poller,
    cleanup_retry: RetryConfig,
}

impl<'a> Rollback<'a> {
    pub fn new(
        gateway: &'a dyn CloudGateway,
        config: &MeshConfig,
        enabled: BTreeSet<Compensation>,
    ) -> Self {
        Self {
            gateway,
            enabled,
            terminate_poller: Poller::new(config.poll_interval(), config.terminate_timeout()),
            cleanup_retry: config.cleanup_retry.to_retry_config(),
        }
    }

    pub fn with_poller(mut self, poller: Poller) -> Self {
        self.terminate_poller = poller;
        self
    }

    pub fn with_cleanup_retry(mut self, retry: RetryConfig) -> Self {
        self.cleanup_retry = retry;
        self
    }

    fn enabled(&self, compensation: Compensation) -> bool {
        self.enabled.contains(&compensation)
    }

    pub async fn run(&self, connection: &Connection) -> RollbackReport {
        let started = Instant::now();
        let mut report = RollbackReport::new();
        tracing::info!(
            connection_id = %connection.id,
            steps = ?self.enabled,
            "Rolling back connection"
        );

        if self.enabled(Compensation::DeleteRoutes) {
            for endpoint in connection.endpoints() {
                self.delete_routes(endpoint, &mut report).await;
            }
        }

        if self.enabled(Compensation::TerminateInstances) {
            let mut targets = Vec::new();
            for endpoint in connection.endpoints() {
                if let Some(target) = self.terminate(endpoint, &mut report).await {
                    targets.push(target);
                }
            }
            if let PollOutcome::DeadlineExceeded { pending } = self
                .terminate_poller
                .wait_until(&targets, "terminated", is_terminated)
                .await
            {
                report.pending_termination = pending;
            }
        }

        if self.enabled(Compensation::ReleaseAddresses) {
            for endpoint in connection.endpoints() {
                self.release_address(endpoint, &mut report).await;
            }
        }

        if self.enabled(Compensation::DeleteSecurityGroups) {
            for endpoint in connection.endpoints() {
                self.delete_security_group(endpoint, &mut report).await;
            }
        }

        report.duration_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            connection_id = %connection.id,
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            duration_ms = report.duration_ms,
            "Rollback finished"
        );
        report
    }

    /// Remove every route in the endpoint's network that targets its instance
    async fn delete_routes(&self, endpoint: &VpnEndpoint, report: &mut RollbackReport) {
        let Some(instance_id) = endpoint.instance_id() else {
            return;
        };
        let client = self.gateway.region_client(&endpoint.region);
        let tables = match client.describe_route_tables().await {
            Ok(tables) => tables,
            Err(err) => {
                report.add_failure(Compensation::DeleteRoutes, &endpoint.network.id, &err);
                return;
            }
        };

        for table in tables.iter().filter(|t| t.network_id == endpoint.network.id) {
            for route in table.routes.iter().filter(|r| r.targets_instance(instance_id)) {
                let Some(destination) = route.destination_cidr.as_deref() else {
                    continue;
                };
                let outcome = client.delete_route(&table.id, destination).await;
                report.record(
                    Compensation::DeleteRoutes,
                    &format!("{}:{destination}", table.id),
                    outcome,
                );
            }
        }
    }

    async fn terminate(
        &self,
        endpoint: &VpnEndpoint,
        report: &mut RollbackReport,
    ) -> Option<PollTarget> {
        let instance_id = endpoint.instance_id()?;
        let client = self.gateway.region_client(&endpoint.region);
        match client.terminate_instances(&[instance_id.to_string()]).await {
            Ok(()) => {
                tracing::info!(instance_id, region = %endpoint.region, "Terminating instance");
                report.add_success(Compensation::TerminateInstances, instance_id);
                Some(PollTarget::new(client, instance_id))
            }
            Err(err) if err.is_not_found() => {
                report.add_success(Compensation::TerminateInstances, instance_id);
                None
            }
            Err(err) => {
                report.add_failure(Compensation::TerminateInstances, instance_id, &err);
                None
            }
        }
    }

    async fn release_address(&self, endpoint: &VpnEndpoint, report: &mut RollbackReport) {
        let Some(allocation_id) = endpoint.allocation_id() else {
            return;
        };
        let client = self.gateway.region_client(&endpoint.region);
        let outcome = retry(
            &self.cleanup_retry,
            "ReleaseAddress",
            CloudError::is_dependency_violation,
            || client.release_address(allocation_id),
        )
        .await;
        report.record(Compensation::ReleaseAddresses, allocation_id, outcome);
    }

    async fn delete_security_group(&self, endpoint: &VpnEndpoint, report: &mut RollbackReport) {
        let Some(group_id) = endpoint.security_group_id.as_deref() else {
            return;
        };
        let client = self.gateway.region_client(&endpoint.region);
        let outcome = retry(
            &self.cleanup_retry,
            "DeleteSecurityGroup",
            CloudError::is_dependency_violation,
            || client.delete_security_group(group_id),
        )
        .await;
        report.record(Compensation::DeleteSecurityGroups, group_id, outcome);
    }
}
