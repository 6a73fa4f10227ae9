//! Provisioning saga
//!
//! Creation runs as a fixed sequence of [`Phase`]s over every endpoint. Each
//! phase finishes for all endpoints before the next starts, because later
//! phases need values produced for every endpoint (firewall rules need every
//! peer's public address, routes need every instance).
//!
//! The [`SagaLog`] records which phases started; when a phase fails the
//! caller hands [`SagaLog::compensations`] to the rollback so only the undo
//! steps of phases that actually ran are attempted.

use crate::bootstrap::{BootstrapContext, UserDataRenderer, generate_pre_shared_key};
use crate::endpoint::Connection;
use crate::error::{MeshError, Result};
use crate::firewall::{SECURITY_GROUP_DESCRIPTION, ingress_rules};
use crate::poller::{PollOutcome, PollTarget, Poller, is_running};
use crate::tags::ConnectionTags;
use crate::topology::TopologyIndex;
use std::collections::BTreeSet;
use std::fmt;
use std::time::Instant;
use vpcmesh_cloud::{
    CloudError, CloudGateway, InstanceState, LaunchRequest, RetryConfig, retry,
};
use vpcmesh_config::MeshConfig;

/// Forward steps of connection creation, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Phase {
    PreCheck,
    AllocateAddresses,
    ConfigureFirewall,
    LaunchInstances,
    WaitRunning,
    DisableSourceDestCheck,
    TagResources,
    AssociateAddresses,
    CreateRoutes,
}

impl Phase {
    pub const ALL: [Phase; 9] = [
        Phase::PreCheck,
        Phase::AllocateAddresses,
        Phase::ConfigureFirewall,
        Phase::LaunchInstances,
        Phase::WaitRunning,
        Phase::DisableSourceDestCheck,
        Phase::TagResources,
        Phase::AssociateAddresses,
        Phase::CreateRoutes,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Phase::PreCheck => "pre-check",
            Phase::AllocateAddresses => "allocate addresses",
            Phase::ConfigureFirewall => "configure firewall",
            Phase::LaunchInstances => "launch instances",
            Phase::WaitRunning => "wait for running",
            Phase::DisableSourceDestCheck => "disable source/dest check",
            Phase::TagResources => "tag resources",
            Phase::AssociateAddresses => "associate addresses",
            Phase::CreateRoutes => "create routes",
        }
    }

    /// Undo step for the resources this phase creates
    pub fn compensation(&self) -> Option<Compensation> {
        match self {
            Phase::AllocateAddresses => Some(Compensation::ReleaseAddresses),
            Phase::ConfigureFirewall => Some(Compensation::DeleteSecurityGroups),
            Phase::LaunchInstances => Some(Compensation::TerminateInstances),
            Phase::CreateRoutes => Some(Compensation::DeleteRoutes),
            Phase::PreCheck
            | Phase::WaitRunning
            | Phase::DisableSourceDestCheck
            | Phase::TagResources
            | Phase::AssociateAddresses => None,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Undo steps, declared in the order rollback runs them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Compensation {
    DeleteRoutes,
    TerminateInstances,
    ReleaseAddresses,
    DeleteSecurityGroups,
}

impl Compensation {
    pub const ALL: [Compensation; 4] = [
        Compensation::DeleteRoutes,
        Compensation::TerminateInstances,
        Compensation::ReleaseAddresses,
        Compensation::DeleteSecurityGroups,
    ];

    /// Every compensation, as used by explicit deletion
    pub fn all() -> BTreeSet<Compensation> {
        Self::ALL.into_iter().collect()
    }

    pub fn name(&self) -> &'static str {
        match self {
            Compensation::DeleteRoutes => "delete routes",
            Compensation::TerminateInstances => "terminate instances",
            Compensation::ReleaseAddresses => "release addresses",
            Compensation::DeleteSecurityGroups => "delete security groups",
        }
    }
}

impl fmt::Display for Compensation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What the saga got through
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SagaLog {
    started: Vec<Phase>,
    completed: Vec<Phase>,
    failed: Option<Phase>,
}

impl SagaLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&mut self, phase: Phase) {
        self.started.push(phase);
    }

    pub fn complete(&mut self, phase: Phase) {
        self.completed.push(phase);
    }

    pub fn fail(&mut self, phase: Phase) {
        self.failed = Some(phase);
    }

    pub fn started(&self) -> &[Phase] {
        &self.started
    }

    pub fn completed(&self) -> &[Phase] {
        &self.completed
    }

    pub fn failed(&self) -> Option<Phase> {
        self.failed
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_none() && self.completed.len() == Phase::ALL.len()
    }

    /// Undo steps for every phase that started, including a failed one that
    /// may have created some of its resources
    pub fn compensations(&self) -> BTreeSet<Compensation> {
        self.started
            .iter()
            .filter_map(Phase::compensation)
            .collect()
    }
}

/// Settings the saga reads from configuration
#[derive(Debug, Clone)]
pub struct SagaSettings {
    pub instance_type: String,
    pub name_tag: String,
    pub authorize_retry: RetryConfig,
    pub launch_poller: Poller,
}

impl SagaSettings {
    pub fn from_config(config: &MeshConfig) -> Self {
        Self {
            instance_type: config.instance_type.clone(),
            name_tag: config.name_tag.clone(),
            authorize_retry: config.authorize_retry.to_retry_config(),
            launch_poller: Poller::new(config.poll_interval(), config.launch_timeout()),
        }
    }
}

fn step(phase: Phase) -> impl Fn(CloudError) -> MeshError {
    move |source| MeshError::ProvisioningStep { phase, source }
}

/// Runs the create phases against a resolved connection
pub struct Provisioner<'a> {
    gateway: &'a dyn CloudGateway,
    config: &'a MeshConfig,
    settings: SagaSettings,
    index: &'a TopologyIndex,
    renderer: &'a dyn UserDataRenderer,
    log: SagaLog,
}

impl<'a> Provisioner<'a> {
    pub fn new(
        gateway: &'a dyn CloudGateway,
        config: &'a MeshConfig,
        index: &'a TopologyIndex,
        renderer: &'a dyn UserDataRenderer,
    ) -> Self {
        Self {
            gateway,
            config,
            settings: SagaSettings::from_config(config),
            index,
            renderer,
            log: SagaLog::new(),
        }
    }

    pub fn with_settings(mut self, settings: SagaSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn log(&self) -> &SagaLog {
        &self.log
    }

    /// Run every phase in order, stopping at the first failure
    ///
    /// Resources are recorded on the endpoints as soon as they exist, so the
    /// connection always reflects what has to be cleaned up.
    pub async fn run(&mut self, connection: &mut Connection) -> Result<()> {
        let started = Instant::now();
        tracing::info!(
            connection_id = %connection.id,
            endpoints = connection.len(),
            "Provisioning connection"
        );

        for phase in Phase::ALL {
            self.log.start(phase);
            tracing::info!(connection_id = %connection.id, phase = %phase, "Phase started");
            if let Err(err) = self.run_phase(phase, connection).await {
                self.log.fail(phase);
                tracing::error!(
                    connection_id = %connection.id,
                    phase = %phase,
                    error = %err,
                    "Phase failed"
                );
                return Err(err);
            }
            self.log.complete(phase);
        }

        tracing::info!(
            connection_id = %connection.id,
            duration_ms = started.elapsed().as_millis() as u64,
            "Connection provisioned"
        );
        Ok(())
    }

    async fn run_phase(&self, phase: Phase, connection: &mut Connection) -> Result<()> {
        match phase {
            Phase::PreCheck => self.pre_check(connection),
            Phase::AllocateAddresses => self.allocate_addresses(connection).await,
            Phase::ConfigureFirewall => self.configure_firewall(connection).await,
            Phase::LaunchInstances => self.launch_instances(connection).await,
            Phase::WaitRunning => self.wait_running(connection).await,
            Phase::DisableSourceDestCheck => self.disable_source_dest_check(connection).await,
            Phase::TagResources => self.tag_resources(connection).await,
            Phase::AssociateAddresses => self.associate_addresses(connection).await,
            Phase::CreateRoutes => self.create_routes(connection).await,
        }
    }

    /// Images exist for every region and no network already routes to a peer
    fn pre_check(&self, connection: &Connection) -> Result<()> {
        for endpoint in connection.endpoints() {
            if self.config.image_for(&endpoint.region.name).is_none() {
                return Err(MeshError::MissingImage {
                    region: endpoint.region.name.clone(),
                });
            }
        }

        for source in connection.endpoints() {
            for peer in connection.endpoints() {
                if source.network.id == peer.network.id {
                    continue;
                }
                for table in self.index.route_tables(&source.network.id) {
                    let existing = table.routes.iter().find(|r| {
                        r.destination_cidr.as_deref() == Some(peer.network.cidr_block.as_str())
                    });
                    if existing.is_some() {
                        return Err(MeshError::PreExistingRoute {
                            route_table_id: table.id.clone(),
                            network_id: source.network.id.clone(),
                            destination: peer.network.cidr_block.clone(),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    async fn allocate_addresses(&self, connection: &mut Connection) -> Result<()> {
        for endpoint in connection.endpoints.values_mut() {
            let client = self.gateway.region_client(&endpoint.region);
            let address = client
                .allocate_address()
                .await
                .map_err(step(Phase::AllocateAddresses))?;
            tracing::info!(
                region = %endpoint.region,
                network_id = %endpoint.network.id,
                public_ip = %address.public_ip,
                "Allocated address"
            );
            endpoint.address = Some(address);
        }
        Ok(())
    }

    async fn configure_firewall(&self, connection: &mut Connection) -> Result<()> {
        let addresses: Vec<(String, String)> = connection
            .endpoints()
            .filter_map(|e| Some((e.network.id.clone(), e.public_ip()?.to_string())))
            .collect();
        let group_name = connection.id.clone();

        for endpoint in connection.endpoints.values_mut() {
            let client = self.gateway.region_client(&endpoint.region);
            let group_id = client
                .create_security_group(&group_name, SECURITY_GROUP_DESCRIPTION, &endpoint.network.id)
                .await
                .map_err(step(Phase::ConfigureFirewall))?;
            endpoint.security_group_id = Some(group_id.clone());

            let peer_ips: Vec<&str> = addresses
                .iter()
                .filter(|(network_id, _)| network_id != &endpoint.network.id)
                .map(|(_, ip)| ip.as_str())
                .collect();
            let rules = ingress_rules(&endpoint.network.cidr_block, &peer_ips);

            // a group created a moment ago may not be visible yet
            retry(
                &self.settings.authorize_retry,
                "AuthorizeSecurityGroupIngress",
                CloudError::is_not_found,
                || client.authorize_ingress(&group_id, &rules),
            )
            .await
            .map_err(step(Phase::ConfigureFirewall))?;

            tracing::info!(
                region = %endpoint.region,
                group_id = %group_id,
                rules = rules.len(),
                "Security group configured"
            );
        }
        Ok(())
    }

    async fn launch_instances(&self, connection: &mut Connection) -> Result<()> {
        let pre_shared_key = generate_pre_shared_key();
        let contexts = BootstrapContext::for_connection(connection, &pre_shared_key);

        for endpoint in connection.endpoints.values_mut() {
            // resources exist by now, so these are step failures
            let image_id = self.config.image_for(&endpoint.region.name).ok_or_else(|| {
                step(Phase::LaunchInstances)(CloudError::unexpected(
                    "RunInstances",
                    format!("no image configured for {}", endpoint.region),
                ))
            })?;
            let subnet_id = endpoint.subnet_id().ok_or_else(|| {
                step(Phase::LaunchInstances)(CloudError::unexpected(
                    "RunInstances",
                    format!("no subnet selected for {}", endpoint.network.id),
                ))
            })?;
            let security_group_id = endpoint.security_group_id.clone().ok_or_else(|| {
                step(Phase::LaunchInstances)(CloudError::unexpected(
                    "CreateSecurityGroup",
                    format!("no security group recorded for {}", endpoint.network.id),
                ))
            })?;
            let context = contexts
                .iter()
                .find(|c| c.local.network_id == endpoint.network.id)
                .ok_or_else(|| {
                    step(Phase::LaunchInstances)(CloudError::unexpected(
                        "AllocateAddress",
                        format!("no public address recorded for {}", endpoint.network.id),
                    ))
                })?;

            let request = LaunchRequest {
                image_id: image_id.to_string(),
                instance_type: self.settings.instance_type.clone(),
                subnet_id: subnet_id.to_string(),
                security_group_ids: vec![security_group_id],
                user_data: self.renderer.render(context)?,
            };

            let client = self.gateway.region_client(&endpoint.region);
            let instance = client
                .run_instance(&request)
                .await
                .map_err(step(Phase::LaunchInstances))?;
            tracing::info!(
                region = %endpoint.region,
                instance_id = %instance.id,
                subnet_id = %request.subnet_id,
                "Launched gateway instance"
            );
            endpoint.instance = Some(instance);
        }
        Ok(())
    }

    async fn wait_running(&self, connection: &mut Connection) -> Result<()> {
        let targets: Vec<PollTarget> = connection
            .endpoints()
            .filter_map(|e| {
                let id = e.instance_id()?;
                Some(PollTarget::new(self.gateway.region_client(&e.region), id))
            })
            .collect();

        match self
            .settings
            .launch_poller
            .wait_until(&targets, "running", is_running)
            .await
        {
            PollOutcome::Satisfied => {
                for instance in connection
                    .endpoints
                    .values_mut()
                    .filter_map(|e| e.instance.as_mut())
                {
                    instance.state = InstanceState::Running;
                }
                Ok(())
            }
            PollOutcome::DeadlineExceeded { pending } => {
                Err(MeshError::InstancesNotReady { pending })
            }
        }
    }

    async fn disable_source_dest_check(&self, connection: &mut Connection) -> Result<()> {
        for endpoint in connection.endpoints() {
            let Some(instance_id) = endpoint.instance_id() else {
                continue;
            };
            let client = self.gateway.region_client(&endpoint.region);
            let interfaces = client
                .describe_network_interfaces(instance_id)
                .await
                .map_err(step(Phase::DisableSourceDestCheck))?;
            for interface in &interfaces {
                client
                    .set_source_dest_check(&interface.id, false)
                    .await
                    .map_err(step(Phase::DisableSourceDestCheck))?;
            }
            tracing::debug!(
                instance_id,
                interfaces = interfaces.len(),
                "Source/dest check disabled"
            );
        }
        Ok(())
    }

    async fn tag_resources(&self, connection: &mut Connection) -> Result<()> {
        let tags = ConnectionTags::for_connection(connection);
        for endpoint in connection.endpoints.values_mut() {
            let own_ip = endpoint.public_ip().map(str::to_string);
            let Some(instance) = endpoint.instance.as_mut() else {
                continue;
            };
            let instance_tags = tags.to_tags(&self.settings.name_tag, own_ip.as_deref());
            self.gateway
                .region_client(&endpoint.region)
                .create_tags(&instance.id, &instance_tags)
                .await
                .map_err(step(Phase::TagResources))?;
            instance.tags = instance_tags;
        }
        tracing::info!(connection_id = %connection.id, "Instances tagged");
        Ok(())
    }

    async fn associate_addresses(&self, connection: &mut Connection) -> Result<()> {
        for endpoint in connection.endpoints.values_mut() {
            let (Some(instance_id), Some(address)) =
                (endpoint.instance_id().map(str::to_string), endpoint.address.as_mut())
            else {
                continue;
            };
            let allocation_id = address.allocation_id.clone().ok_or_else(|| {
                step(Phase::AssociateAddresses)(CloudError::unexpected(
                    "AllocateAddress",
                    format!("address {} has no allocation id", address.public_ip),
                ))
            })?;
            self.gateway
                .region_client(&endpoint.region)
                .associate_address(&allocation_id, &instance_id)
                .await
                .map_err(step(Phase::AssociateAddresses))?;
            tracing::info!(
                public_ip = %address.public_ip,
                instance_id = %instance_id,
                "Address associated"
            );
            address.instance_id = Some(instance_id);
        }
        Ok(())
    }

    /// One route per (source, peer) pair in every route table of the source
    async fn create_routes(&self, connection: &mut Connection) -> Result<()> {
        let mut created = 0usize;
        for source in connection.endpoints() {
            let Some(instance_id) = source.instance_id() else {
                continue;
            };
            let client = self.gateway.region_client(&source.region);
            for peer in connection.endpoints() {
                if peer.network.id == source.network.id {
                    continue;
                }
                for table in self.index.route_tables(&source.network.id) {
                    client
                        .create_route(&table.id, &peer.network.cidr_block, instance_id)
                        .await
                        .map_err(step(Phase::CreateRoutes))?;
                    tracing::debug!(
                        route_table_id = %table.id,
                        destination = %peer.network.cidr_block,
                        instance_id,
                        "Route created"
                    );
                    created += 1;
                }
            }
        }
        tracing::info!(connection_id = %connection.id, routes = created, "Mesh routes created");
        Ok(())
    }
}
