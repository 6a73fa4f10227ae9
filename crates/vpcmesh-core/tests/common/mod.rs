#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use vpcmesh_cloud::{
    Address, CloudError, CloudGateway, IngressRule, Instance, InstanceState, LaunchRequest,
    Network, NetworkInterface, Region, RegionClient, Result, Route, RouteState, RouteTable,
    RouteTableAssociation, SecurityGroup, Subnet, Tag,
};
use vpcmesh_config::{MeshConfig, RetrySettings};

/// Injected failure for one operation
struct Failure {
    code: String,
    /// Calls that succeed before failures start
    skip: u32,
    /// Failures left; `None` fails forever
    remaining: Option<u32>,
}

pub struct FakeGroup {
    pub group: SecurityGroup,
    pub rules: Vec<IngressRule>,
}

pub struct FakeInstance {
    pub region: String,
    pub instance: Instance,
    pub request: LaunchRequest,
    pub source_dest_check: bool,
    /// Describes left before the next state transition
    polls_left: u32,
}

impl FakeInstance {
    pub fn interface_id(&self) -> String {
        format!("eni-{}", self.instance.id.trim_start_matches("i-"))
    }
}

#[derive(Default)]
pub struct FakeState {
    pub regions: Vec<Region>,
    pub networks: Vec<Network>,
    pub subnets: Vec<Subnet>,
    pub route_tables: Vec<RouteTable>,
    pub groups: Vec<FakeGroup>,
    pub addresses: Vec<(String, Address)>,
    pub instances: Vec<FakeInstance>,
    pub calls: Vec<String>,
    pub launch_polls: u32,
    pub terminate_polls: u32,
    failures: HashMap<String, Failure>,
    next_id: u32,
}

impl FakeState {
    fn next_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    fn region_of_network(&self, network_id: &str) -> Option<&str> {
        self.networks
            .iter()
            .find(|n| n.id == network_id)
            .map(|n| n.region.as_str())
    }

    fn in_region(&self, network_id: &str, region: &str) -> bool {
        self.region_of_network(network_id) == Some(region)
    }

    fn check(&mut self, region: &str, operation: &'static str) -> Result<()> {
        self.calls.push(operation.to_string());
        for key in [format!("{region}:{operation}"), operation.to_string()] {
            if let Some(failure) = self.failures.get_mut(&key) {
                if failure.skip > 0 {
                    failure.skip -= 1;
                    continue;
                }
                match failure.remaining {
                    None => {}
                    Some(0) => continue,
                    Some(ref mut n) => *n -= 1,
                }
                return Err(CloudError::api(
                    operation,
                    Some(failure.code.clone()),
                    format!("injected {}", failure.code),
                ));
            }
        }
        Ok(())
    }

    /// Advance an instance one describe further along its lifecycle
    fn observe(&mut self, index: usize) {
        let fake = &mut self.instances[index];
        let next = match fake.instance.state {
            InstanceState::Pending => InstanceState::Running,
            InstanceState::ShuttingDown => InstanceState::Terminated,
            _ => return,
        };
        if fake.polls_left > 0 {
            fake.polls_left -= 1;
            return;
        }
        fake.instance.state = next;
        if next == InstanceState::Terminated {
            let id = fake.instance.id.clone();
            for (_, address) in &mut self.addresses {
                if address.instance_id.as_deref() == Some(id.as_str()) {
                    address.instance_id = None;
                }
            }
        }
    }
}

fn not_found(operation: &'static str, code: &str, id: &str) -> CloudError {
    CloudError::api(operation, Some(code), format!("{id} does not exist"))
}

/// In-memory multi-region cloud
#[derive(Clone, Default)]
pub struct FakeCloud {
    state: Arc<Mutex<FakeState>>,
    pub query_delay: Option<Duration>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl FakeCloud {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn add_region(&self, name: &str) {
        self.state()
            .regions
            .push(Region::new(name, format!("ec2.{name}.amazonaws.com")));
    }

    pub fn add_network(&self, region: &str, id: &str, cidr: &str) {
        self.state().networks.push(Network {
            id: id.to_string(),
            cidr_block: cidr.to_string(),
            region: region.to_string(),
        });
    }

    pub fn add_subnet(&self, network_id: &str, id: &str, cidr: &str, available: u32) {
        self.state().subnets.push(Subnet {
            id: id.to_string(),
            network_id: network_id.to_string(),
            cidr_block: cidr.to_string(),
            available_addresses: available,
        });
    }

    pub fn add_route_table(&self, table: RouteTable) {
        self.state().route_tables.push(table);
    }

    /// Subnet with its own route table holding an internet default route
    pub fn add_public_subnet(&self, network_id: &str, id: &str, cidr: &str) {
        self.add_subnet(network_id, id, cidr, 250);
        let network_cidr = self
            .state()
            .networks
            .iter()
            .find(|n| n.id == network_id)
            .map(|n| n.cidr_block.clone())
            .unwrap();
        self.add_route_table(RouteTable {
            id: format!("rtb-{}", id.trim_start_matches("subnet-")),
            network_id: network_id.to_string(),
            routes: vec![
                Route {
                    destination_cidr: Some(network_cidr),
                    gateway_id: Some("local".to_string()),
                    instance_id: None,
                    state: RouteState::Active,
                },
                Route {
                    destination_cidr: Some("0.0.0.0/0".to_string()),
                    gateway_id: Some(format!("igw-{}", network_id.trim_start_matches("vpc-"))),
                    instance_id: None,
                    state: RouteState::Active,
                },
            ],
            associations: vec![RouteTableAssociation {
                subnet_id: Some(id.to_string()),
                main: false,
            }],
        });
    }

    /// Add a route to an existing table
    pub fn add_route(&self, route_table_id: &str, destination: &str, gateway_id: &str) {
        let mut state = self.state();
        let table = state
            .route_tables
            .iter_mut()
            .find(|t| t.id == route_table_id)
            .unwrap();
        table.routes.push(Route {
            destination_cidr: Some(destination.to_string()),
            gateway_id: Some(gateway_id.to_string()),
            instance_id: None,
            state: RouteState::Active,
        });
    }

    /// Fail every call of `operation` with provider error `code`
    pub fn fail(&self, operation: &str, code: &str) {
        self.inject(operation, code, 0, None);
    }

    /// Fail the first `times` calls of `operation`
    pub fn fail_times(&self, operation: &str, code: &str, times: u32) {
        self.inject(operation, code, 0, Some(times));
    }

    /// Let `successes` calls through, then fail forever
    pub fn fail_after(&self, operation: &str, code: &str, successes: u32) {
        self.inject(operation, code, successes, None);
    }

    /// Fail `operation` in one region only
    pub fn fail_in_region(&self, region: &str, operation: &str, code: &str) {
        self.inject(&format!("{region}:{operation}"), code, 0, None);
    }

    fn inject(&self, key: &str, code: &str, skip: u32, remaining: Option<u32>) {
        self.state().failures.insert(
            key.to_string(),
            Failure {
                code: code.to_string(),
                skip,
                remaining,
            },
        );
    }

    pub fn clear_failures(&self) {
        self.state().failures.clear();
    }

    pub fn set_launch_polls(&self, polls: u32) {
        self.state().launch_polls = polls;
    }

    pub fn set_terminate_polls(&self, polls: u32) {
        self.state().terminate_polls = polls;
    }

    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    pub fn calls_to(&self, operation: &str) -> usize {
        self.state().calls.iter().filter(|c| *c == operation).count()
    }

    /// Any call that changes state
    pub fn mutating_calls(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| !c.starts_with("Describe"))
            .collect()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// (route table, destination, instance) for every instance-targeted route
    pub fn instance_routes(&self) -> Vec<(String, String, String)> {
        let state = self.state();
        let mut routes: Vec<_> = state
            .route_tables
            .iter()
            .flat_map(|t| {
                t.routes.iter().filter_map(move |r| {
                    Some((
                        t.id.clone(),
                        r.destination_cidr.clone()?,
                        r.instance_id.clone()?,
                    ))
                })
            })
            .collect();
        routes.sort();
        routes
    }

    pub fn live_instances(&self) -> Vec<Instance> {
        self.state()
            .instances
            .iter()
            .filter(|f| f.instance.state != InstanceState::Terminated)
            .map(|f| f.instance.clone())
            .collect()
    }

    pub fn instance(&self, id: &str) -> Option<Instance> {
        self.state()
            .instances
            .iter()
            .find(|f| f.instance.id == id)
            .map(|f| f.instance.clone())
    }

    pub fn group_count(&self) -> usize {
        self.state().groups.len()
    }

    pub fn address_count(&self) -> usize {
        self.state().addresses.len()
    }

    pub fn client(&self, region: &str) -> Arc<dyn RegionClient> {
        let region = self
            .state()
            .regions
            .iter()
            .find(|r| r.name == region)
            .cloned()
            .unwrap();
        self.region_client(&region)
    }
}

#[async_trait]
impl CloudGateway for FakeCloud {
    fn name(&self) -> &str {
        "fake"
    }

    async fn describe_regions(&self) -> Result<Vec<Region>> {
        let mut state = self.state();
        state.check("global", "DescribeRegions")?;
        Ok(state.regions.clone())
    }

    fn region_client(&self, region: &Region) -> Arc<dyn RegionClient> {
        Arc::new(FakeRegion {
            region: region.clone(),
            cloud: self.clone(),
        })
    }
}

pub struct FakeRegion {
    region: Region,
    cloud: FakeCloud,
}

impl FakeRegion {
    fn state(&self, operation: &'static str) -> Result<MutexGuard<'_, FakeState>> {
        let mut state = self.cloud.state();
        state.check(&self.region.name, operation)?;
        Ok(state)
    }

    fn name(&self) -> &str {
        &self.region.name
    }

    /// Hold a describe call open for `query_delay`, counting concurrent calls
    async fn delay(&self) {
        if let Some(delay) = self.cloud.query_delay {
            let now = self.cloud.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.cloud.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(delay).await;
            self.cloud.in_flight.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl RegionClient for FakeRegion {
    fn region(&self) -> &Region {
        &self.region
    }

    async fn describe_networks(&self) -> Result<Vec<Network>> {
        self.delay().await;
        let state = self.state("DescribeVpcs")?;
        Ok(state
            .networks
            .iter()
            .filter(|n| n.region == self.name())
            .cloned()
            .collect())
    }

    async fn describe_subnets(&self) -> Result<Vec<Subnet>> {
        self.delay().await;
        let state = self.state("DescribeSubnets")?;
        Ok(state
            .subnets
            .iter()
            .filter(|s| state.in_region(&s.network_id, self.name()))
            .cloned()
            .collect())
    }

    async fn describe_route_tables(&self) -> Result<Vec<RouteTable>> {
        self.delay().await;
        let state = self.state("DescribeRouteTables")?;
        Ok(state
            .route_tables
            .iter()
            .filter(|t| state.in_region(&t.network_id, self.name()))
            .cloned()
            .collect())
    }

    async fn create_route(
        &self,
        route_table_id: &str,
        destination_cidr: &str,
        instance_id: &str,
    ) -> Result<()> {
        let mut state = self.state("CreateRoute")?;
        let region = self.name().to_string();
        let networks = state.networks.clone();
        let table = state
            .route_tables
            .iter_mut()
            .find(|t| {
                t.id == route_table_id
                    && networks.iter().any(|n| n.id == t.network_id && n.region == region)
            })
            .ok_or_else(|| not_found("CreateRoute", "InvalidRouteTableID.NotFound", route_table_id))?;
        if table
            .routes
            .iter()
            .any(|r| r.destination_cidr.as_deref() == Some(destination_cidr))
        {
            return Err(CloudError::api(
                "CreateRoute",
                Some("RouteAlreadyExists"),
                format!("{destination_cidr} already routed"),
            ));
        }
        table.routes.push(Route {
            destination_cidr: Some(destination_cidr.to_string()),
            gateway_id: None,
            instance_id: Some(instance_id.to_string()),
            state: RouteState::Active,
        });
        Ok(())
    }

    async fn delete_route(&self, route_table_id: &str, destination_cidr: &str) -> Result<()> {
        let mut state = self.state("DeleteRoute")?;
        let table = state
            .route_tables
            .iter_mut()
            .find(|t| t.id == route_table_id)
            .ok_or_else(|| not_found("DeleteRoute", "InvalidRouteTableID.NotFound", route_table_id))?;
        let before = table.routes.len();
        table
            .routes
            .retain(|r| r.destination_cidr.as_deref() != Some(destination_cidr));
        if table.routes.len() == before {
            return Err(not_found("DeleteRoute", "InvalidRoute.NotFound", destination_cidr));
        }
        Ok(())
    }

    async fn describe_security_groups(&self) -> Result<Vec<SecurityGroup>> {
        self.delay().await;
        let state = self.state("DescribeSecurityGroups")?;
        Ok(state
            .groups
            .iter()
            .filter(|g| {
                g.group
                    .network_id
                    .as_deref()
                    .is_some_and(|n| state.in_region(n, self.name()))
            })
            .map(|g| g.group.clone())
            .collect())
    }

    async fn create_security_group(
        &self,
        name: &str,
        _description: &str,
        network_id: &str,
    ) -> Result<String> {
        let mut state = self.state("CreateSecurityGroup")?;
        if !state.in_region(network_id, self.name()) {
            return Err(not_found("CreateSecurityGroup", "InvalidVpcID.NotFound", network_id));
        }
        if state
            .groups
            .iter()
            .any(|g| g.group.name == name && g.group.network_id.as_deref() == Some(network_id))
        {
            return Err(CloudError::api(
                "CreateSecurityGroup",
                Some("InvalidGroup.Duplicate"),
                format!("{name} exists"),
            ));
        }
        let id = format!("sg-{:08x}", state.next_id());
        state.groups.push(FakeGroup {
            group: SecurityGroup {
                id: id.clone(),
                name: name.to_string(),
                network_id: Some(network_id.to_string()),
            },
            rules: Vec::new(),
        });
        Ok(id)
    }

    async fn authorize_ingress(&self, group_id: &str, rules: &[IngressRule]) -> Result<()> {
        let mut state = self.state("AuthorizeSecurityGroupIngress")?;
        let group = state
            .groups
            .iter_mut()
            .find(|g| g.group.id == group_id)
            .ok_or_else(|| {
                not_found("AuthorizeSecurityGroupIngress", "InvalidGroup.NotFound", group_id)
            })?;
        group.rules.extend(rules.iter().cloned());
        Ok(())
    }

    async fn delete_security_group(&self, group_id: &str) -> Result<()> {
        let mut state = self.state("DeleteSecurityGroup")?;
        let in_use = state.instances.iter().any(|f| {
            f.instance.state != InstanceState::Terminated
                && f.request.security_group_ids.iter().any(|g| g == group_id)
        });
        if in_use {
            return Err(CloudError::api(
                "DeleteSecurityGroup",
                Some("DependencyViolation"),
                format!("{group_id} has a dependent object"),
            ));
        }
        let before = state.groups.len();
        state.groups.retain(|g| g.group.id != group_id);
        if state.groups.len() == before {
            return Err(not_found("DeleteSecurityGroup", "InvalidGroup.NotFound", group_id));
        }
        Ok(())
    }

    async fn allocate_address(&self) -> Result<Address> {
        let mut state = self.state("AllocateAddress")?;
        let n = state.next_id();
        let address = Address {
            public_ip: format!("203.0.113.{n}"),
            allocation_id: Some(format!("eipalloc-{n:08x}")),
            instance_id: None,
        };
        state
            .addresses
            .push((self.name().to_string(), address.clone()));
        Ok(address)
    }

    async fn associate_address(&self, allocation_id: &str, instance_id: &str) -> Result<()> {
        let mut state = self.state("AssociateAddress")?;
        if !state.instances.iter().any(|f| f.instance.id == instance_id) {
            return Err(not_found("AssociateAddress", "InvalidInstanceID.NotFound", instance_id));
        }
        let (_, address) = state
            .addresses
            .iter_mut()
            .find(|(_, a)| a.allocation_id.as_deref() == Some(allocation_id))
            .ok_or_else(|| {
                not_found("AssociateAddress", "InvalidAllocationID.NotFound", allocation_id)
            })?;
        address.instance_id = Some(instance_id.to_string());
        Ok(())
    }

    async fn release_address(&self, allocation_id: &str) -> Result<()> {
        let mut state = self.state("ReleaseAddress")?;
        let Some(position) = state
            .addresses
            .iter()
            .position(|(_, a)| a.allocation_id.as_deref() == Some(allocation_id))
        else {
            return Err(not_found("ReleaseAddress", "InvalidAllocationID.NotFound", allocation_id));
        };
        if state.addresses[position].1.instance_id.is_some() {
            return Err(CloudError::api(
                "ReleaseAddress",
                Some("InvalidIPAddress.InUse"),
                format!("{allocation_id} is associated"),
            ));
        }
        state.addresses.remove(position);
        Ok(())
    }

    async fn describe_addresses(&self) -> Result<Vec<Address>> {
        self.delay().await;
        let state = self.state("DescribeAddresses")?;
        Ok(state
            .addresses
            .iter()
            .filter(|(region, _)| region == self.name())
            .map(|(_, a)| a.clone())
            .collect())
    }

    async fn describe_network_interfaces(
        &self,
        instance_id: &str,
    ) -> Result<Vec<NetworkInterface>> {
        let state = self.state("DescribeNetworkInterfaces")?;
        Ok(state
            .instances
            .iter()
            .filter(|f| f.region == self.name() && f.instance.id == instance_id)
            .map(|f| NetworkInterface {
                id: f.interface_id(),
                instance_id: Some(f.instance.id.clone()),
            })
            .collect())
    }

    async fn set_source_dest_check(&self, interface_id: &str, enabled: bool) -> Result<()> {
        let mut state = self.state("ModifyNetworkInterfaceAttribute")?;
        let fake = state
            .instances
            .iter_mut()
            .find(|f| f.interface_id() == interface_id)
            .ok_or_else(|| {
                not_found(
                    "ModifyNetworkInterfaceAttribute",
                    "InvalidNetworkInterfaceID.NotFound",
                    interface_id,
                )
            })?;
        fake.source_dest_check = enabled;
        Ok(())
    }

    async fn run_instance(&self, request: &LaunchRequest) -> Result<Instance> {
        let mut state = self.state("RunInstances")?;
        let network_id = state
            .subnets
            .iter()
            .find(|s| s.id == request.subnet_id)
            .map(|s| s.network_id.clone())
            .ok_or_else(|| not_found("RunInstances", "InvalidSubnetID.NotFound", &request.subnet_id))?;
        let instance = Instance {
            id: format!("i-{:08x}", state.next_id()),
            state: InstanceState::Pending,
            network_id: Some(network_id),
            subnet_id: Some(request.subnet_id.clone()),
            tags: Vec::new(),
        };
        let polls_left = state.launch_polls;
        state.instances.push(FakeInstance {
            region: self.name().to_string(),
            instance: instance.clone(),
            request: request.clone(),
            source_dest_check: true,
            polls_left,
        });
        Ok(instance)
    }

    async fn describe_instances(&self, ids: &[String]) -> Result<Vec<Instance>> {
        self.delay().await;
        let mut state = self.state("DescribeInstances")?;
        for id in ids {
            if !state
                .instances
                .iter()
                .any(|f| f.region == self.name() && &f.instance.id == id)
            {
                return Err(not_found("DescribeInstances", "InvalidInstanceID.NotFound", id));
            }
        }
        let selected: Vec<usize> = state
            .instances
            .iter()
            .enumerate()
            .filter(|(_, f)| {
                f.region == self.name() && (ids.is_empty() || ids.contains(&f.instance.id))
            })
            .map(|(i, _)| i)
            .collect();
        for &index in &selected {
            state.observe(index);
        }
        Ok(selected
            .into_iter()
            .map(|i| state.instances[i].instance.clone())
            .collect())
    }

    async fn terminate_instances(&self, ids: &[String]) -> Result<()> {
        let mut state = self.state("TerminateInstances")?;
        let polls = state.terminate_polls;
        for id in ids {
            let fake = state
                .instances
                .iter_mut()
                .find(|f| &f.instance.id == id)
                .ok_or_else(|| not_found("TerminateInstances", "InvalidInstanceID.NotFound", id))?;
            if fake.instance.state != InstanceState::Terminated {
                fake.instance.state = InstanceState::ShuttingDown;
                fake.polls_left = polls;
            }
        }
        Ok(())
    }

    async fn create_tags(&self, resource_id: &str, tags: &[Tag]) -> Result<()> {
        let mut state = self.state("CreateTags")?;
        let fake = state
            .instances
            .iter_mut()
            .find(|f| f.instance.id == resource_id)
            .ok_or_else(|| not_found("CreateTags", "InvalidID.NotFound", resource_id))?;
        for tag in tags {
            fake.instance.tags.retain(|t| t.key != tag.key);
            fake.instance.tags.push(tag.clone());
        }
        Ok(())
    }
}

/// vpc-aaaa (10.0.0.0/16) in us-east-1 and vpc-bbbb (10.1.0.0/16) in
/// eu-west-1, one public subnet each
pub fn two_region_cloud() -> FakeCloud {
    let cloud = FakeCloud::new();
    cloud.add_region("us-east-1");
    cloud.add_region("eu-west-1");
    cloud.add_network("us-east-1", "vpc-aaaa", "10.0.0.0/16");
    cloud.add_network("eu-west-1", "vpc-bbbb", "10.1.0.0/16");
    cloud.add_public_subnet("vpc-aaaa", "subnet-aaaa", "10.0.1.0/24");
    cloud.add_public_subnet("vpc-bbbb", "subnet-bbbb", "10.1.1.0/24");
    cloud
}

/// [`two_region_cloud`] plus vpc-cccc (10.2.0.0/16) in ap-southeast-2
pub fn three_region_cloud() -> FakeCloud {
    let cloud = two_region_cloud();
    cloud.add_region("ap-southeast-2");
    cloud.add_network("ap-southeast-2", "vpc-cccc", "10.2.0.0/16");
    cloud.add_public_subnet("vpc-cccc", "subnet-cccc", "10.2.1.0/24");
    cloud
}

/// Fast timings and an image for every fixture region
pub fn test_config() -> MeshConfig {
    let images: BTreeMap<String, String> = [
        ("us-east-1", "ami-0use1"),
        ("eu-west-1", "ami-0euw1"),
        ("ap-southeast-2", "ami-0apse2"),
    ]
    .into_iter()
    .map(|(region, image)| (region.to_string(), image.to_string()))
    .collect();

    MeshConfig {
        images,
        poll_interval_secs: 1,
        launch_timeout_secs: 5,
        terminate_timeout_secs: 5,
        authorize_retry: RetrySettings {
            max_attempts: 4,
            initial_delay_ms: 1,
            max_delay_ms: None,
            multiplier: 1.0,
        },
        cleanup_retry: RetrySettings {
            max_attempts: 4,
            initial_delay_ms: 1,
            max_delay_ms: Some(4),
            multiplier: 2.0,
        },
        ..MeshConfig::default()
    }
}

pub fn tokens(raw: &[&str]) -> Vec<String> {
    raw.iter().map(|t| t.to_string()).collect()
}
