//! EC2 gateway implementation

use crate::convert;
use crate::error::{missing, sdk_error};
use async_trait::async_trait;
use aws_config::meta::region::RegionProviderChain;
use aws_config::{BehaviorVersion, SdkConfig};
use aws_sdk_ec2::Client;
use aws_sdk_ec2::types::{
    AttributeBooleanValue, DomainType, Filter, InstanceType, IpPermission, IpRange,
};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use std::sync::Arc;
use vpcmesh_cloud::{
    Address, CloudGateway, IngressRule, Instance, LaunchRequest, Network, NetworkInterface,
    Region, RegionClient, Result, RouteTable, SecurityGroup, Subnet, Tag,
};

/// Region used for the initial `DescribeRegions` call when none is configured
const FALLBACK_REGION: &str = "us-east-1";

/// AWS EC2 gateway
pub struct Ec2Gateway {
    config: SdkConfig,
    client: Client,
}

impl Ec2Gateway {
    pub fn new(config: SdkConfig) -> Self {
        let client = Client::new(&config);
        Self { config, client }
    }

    /// Build from the default credential and region provider chains
    pub async fn from_env() -> Self {
        let region = RegionProviderChain::default_provider().or_else(FALLBACK_REGION);
        let config = aws_config::defaults(BehaviorVersion::latest())
            .region(region)
            .load()
            .await;
        Self::new(config)
    }
}

#[async_trait]
impl CloudGateway for Ec2Gateway {
    fn name(&self) -> &str {
        "aws"
    }

    async fn describe_regions(&self) -> Result<Vec<Region>> {
        let output = self
            .client
            .describe_regions()
            .send()
            .await
            .map_err(|e| sdk_error("DescribeRegions", e))?;

        let regions: Vec<Region> = output
            .regions()
            .iter()
            .filter_map(|r| {
                let name = r.region_name()?;
                let endpoint = r.endpoint().unwrap_or_default();
                Some(Region::new(name, endpoint))
            })
            .collect();

        tracing::debug!(count = regions.len(), "Discovered regions");
        Ok(regions)
    }

    fn region_client(&self, region: &Region) -> Arc<dyn RegionClient> {
        Arc::new(Ec2RegionClient::new(&self.config, region.clone()))
    }
}

/// EC2 client pinned to one region
pub struct Ec2RegionClient {
    region: Region,
    client: Client,
}

impl Ec2RegionClient {
    pub fn new(config: &SdkConfig, region: Region) -> Self {
        let ec2_config = aws_sdk_ec2::config::Builder::from(config)
            .region(aws_sdk_ec2::config::Region::new(region.name.clone()))
            .build();
        Self {
            region,
            client: Client::from_conf(ec2_config),
        }
    }
}

fn ip_permission(rule: &IngressRule) -> IpPermission {
    let ranges = rule
        .cidrs
        .iter()
        .map(|cidr| IpRange::builder().cidr_ip(cidr).build())
        .collect();
    IpPermission::builder()
        .ip_protocol(rule.protocol.as_str())
        .from_port(rule.from_port)
        .to_port(rule.to_port)
        .set_ip_ranges(Some(ranges))
        .build()
}

#[async_trait]
impl RegionClient for Ec2RegionClient {
    fn region(&self) -> &Region {
        &self.region
    }

    async fn describe_networks(&self) -> Result<Vec<Network>> {
        let mut networks = Vec::new();
        let mut next_token = None;
        loop {
            let output = self
                .client
                .describe_vpcs()
                .set_next_token(next_token)
                .send()
                .await
                .map_err(|e| sdk_error("DescribeVpcs", e))?;

            networks.extend(
                output
                    .vpcs()
                    .iter()
                    .filter_map(|vpc| convert::network(vpc, &self.region.name)),
            );

            next_token = output.next_token().map(str::to_string);
            if next_token.is_none() {
                break;
            }
        }
        Ok(networks)
    }

    async fn describe_subnets(&self) -> Result<Vec<Subnet>> {
        let mut subnets = Vec::new();
        let mut next_token = None;
        loop {
            let output = self
                .client
                .describe_subnets()
                .set_next_token(next_token)
                .send()
                .await
                .map_err(|e| sdk_error("DescribeSubnets", e))?;

            subnets.extend(output.subnets().iter().filter_map(convert::subnet));

            next_token = output.next_token().map(str::to_string);
            if next_token.is_none() {
                break;
            }
        }
        Ok(subnets)
    }

    async fn describe_route_tables(&self) -> Result<Vec<RouteTable>> {
        let mut tables = Vec::new();
        let mut next_token = None;
        loop {
            let output = self
                .client
                .describe_route_tables()
                .set_next_token(next_token)
                .send()
                .await
                .map_err(|e| sdk_error("DescribeRouteTables", e))?;

            tables.extend(output.route_tables().iter().filter_map(convert::route_table));

            next_token = output.next_token().map(str::to_string);
            if next_token.is_none() {
                break;
            }
        }
        Ok(tables)
    }

    async fn create_route(
        &self,
        route_table_id: &str,
        destination_cidr: &str,
        instance_id: &str,
    ) -> Result<()> {
        self.client
            .create_route()
            .route_table_id(route_table_id)
            .destination_cidr_block(destination_cidr)
            .instance_id(instance_id)
            .send()
            .await
            .map_err(|e| sdk_error("CreateRoute", e))?;
        Ok(())
    }

    async fn delete_route(&self, route_table_id: &str, destination_cidr: &str) -> Result<()> {
        self.client
            .delete_route()
            .route_table_id(route_table_id)
            .destination_cidr_block(destination_cidr)
            .send()
            .await
            .map_err(|e| sdk_error("DeleteRoute", e))?;
        Ok(())
    }

    async fn describe_security_groups(&self) -> Result<Vec<SecurityGroup>> {
        let mut groups = Vec::new();
        let mut next_token = None;
        loop {
            let output = self
                .client
                .describe_security_groups()
                .set_next_token(next_token)
                .send()
                .await
                .map_err(|e| sdk_error("DescribeSecurityGroups", e))?;

            groups.extend(
                output
                    .security_groups()
                    .iter()
                    .filter_map(convert::security_group),
            );

            next_token = output.next_token().map(str::to_string);
            if next_token.is_none() {
                break;
            }
        }
        Ok(groups)
    }

    async fn create_security_group(
        &self,
        name: &str,
        description: &str,
        network_id: &str,
    ) -> Result<String> {
        let output = self
            .client
            .create_security_group()
            .group_name(name)
            .description(description)
            .vpc_id(network_id)
            .send()
            .await
            .map_err(|e| sdk_error("CreateSecurityGroup", e))?;

        output
            .group_id()
            .map(str::to_string)
            .ok_or_else(|| missing("CreateSecurityGroup", "GroupId"))
    }

    async fn authorize_ingress(&self, group_id: &str, rules: &[IngressRule]) -> Result<()> {
        self.client
            .authorize_security_group_ingress()
            .group_id(group_id)
            .set_ip_permissions(Some(rules.iter().map(ip_permission).collect()))
            .send()
            .await
            .map_err(|e| sdk_error("AuthorizeSecurityGroupIngress", e))?;
        Ok(())
    }

    async fn delete_security_group(&self, group_id: &str) -> Result<()> {
        self.client
            .delete_security_group()
            .group_id(group_id)
            .send()
            .await
            .map_err(|e| sdk_error("DeleteSecurityGroup", e))?;
        Ok(())
    }

    async fn allocate_address(&self) -> Result<Address> {
        let output = self
            .client
            .allocate_address()
            .domain(DomainType::Vpc)
            .send()
            .await
            .map_err(|e| sdk_error("AllocateAddress", e))?;

        let public_ip = output
            .public_ip()
            .ok_or_else(|| missing("AllocateAddress", "PublicIp"))?;
        Ok(Address {
            public_ip: public_ip.to_string(),
            allocation_id: output.allocation_id().map(str::to_string),
            instance_id: None,
        })
    }

    async fn associate_address(&self, allocation_id: &str, instance_id: &str) -> Result<()> {
        self.client
            .associate_address()
            .allocation_id(allocation_id)
            .instance_id(instance_id)
            .send()
            .await
            .map_err(|e| sdk_error("AssociateAddress", e))?;
        Ok(())
    }

    async fn release_address(&self, allocation_id: &str) -> Result<()> {
        self.client
            .release_address()
            .allocation_id(allocation_id)
            .send()
            .await
            .map_err(|e| sdk_error("ReleaseAddress", e))?;
        Ok(())
    }

    async fn describe_addresses(&self) -> Result<Vec<Address>> {
        let output = self
            .client
            .describe_addresses()
            .send()
            .await
            .map_err(|e| sdk_error("DescribeAddresses", e))?;

        Ok(output
            .addresses()
            .iter()
            .filter_map(convert::address)
            .collect())
    }

    async fn describe_network_interfaces(
        &self,
        instance_id: &str,
    ) -> Result<Vec<NetworkInterface>> {
        let output = self
            .client
            .describe_network_interfaces()
            .filters(
                Filter::builder()
                    .name("attachment.instance-id")
                    .values(instance_id)
                    .build(),
            )
            .send()
            .await
            .map_err(|e| sdk_error("DescribeNetworkInterfaces", e))?;

        Ok(output
            .network_interfaces()
            .iter()
            .filter_map(convert::network_interface)
            .collect())
    }

    async fn set_source_dest_check(&self, interface_id: &str, enabled: bool) -> Result<()> {
        self.client
            .modify_network_interface_attribute()
            .network_interface_id(interface_id)
            .source_dest_check(AttributeBooleanValue::builder().value(enabled).build())
            .send()
            .await
            .map_err(|e| sdk_error("ModifyNetworkInterfaceAttribute", e))?;
        Ok(())
    }

    async fn run_instance(&self, request: &LaunchRequest) -> Result<Instance> {
        let output = self
            .client
            .run_instances()
            .image_id(&request.image_id)
            .instance_type(InstanceType::from(request.instance_type.as_str()))
            .min_count(1)
            .max_count(1)
            .subnet_id(&request.subnet_id)
            .set_security_group_ids(Some(request.security_group_ids.clone()))
            .user_data(STANDARD.encode(request.user_data.as_bytes()))
            .send()
            .await
            .map_err(|e| sdk_error("RunInstances", e))?;

        output
            .instances()
            .iter()
            .find_map(convert::instance)
            .ok_or_else(|| missing("RunInstances", "Instances"))
    }

    async fn describe_instances(&self, ids: &[String]) -> Result<Vec<Instance>> {
        let instance_ids = (!ids.is_empty()).then(|| ids.to_vec());
        let mut instances = Vec::new();
        let mut next_token = None;
        loop {
            let output = self
                .client
                .describe_instances()
                .set_instance_ids(instance_ids.clone())
                .set_next_token(next_token)
                .send()
                .await
                .map_err(|e| sdk_error("DescribeInstances", e))?;

            instances.extend(
                output
                    .reservations()
                    .iter()
                    .flat_map(|r| r.instances())
                    .filter_map(convert::instance),
            );

            next_token = output.next_token().map(str::to_string);
            if next_token.is_none() {
                break;
            }
        }
        Ok(instances)
    }

    async fn terminate_instances(&self, ids: &[String]) -> Result<()> {
        self.client
            .terminate_instances()
            .set_instance_ids(Some(ids.to_vec()))
            .send()
            .await
            .map_err(|e| sdk_error("TerminateInstances", e))?;
        Ok(())
    }

    async fn create_tags(&self, resource_id: &str, tags: &[Tag]) -> Result<()> {
        self.client
            .create_tags()
            .resources(resource_id)
            .set_tags(Some(tags.iter().map(convert::sdk_tag).collect()))
            .send()
            .await
            .map_err(|e| sdk_error("CreateTags", e))?;
        Ok(())
    }
}
