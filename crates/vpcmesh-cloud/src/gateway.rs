//! Cloud gateway trait definitions

use crate::error::Result;
use crate::model::{
    Address, IngressRule, Instance, LaunchRequest, Network, NetworkInterface, Region, RouteTable,
    SecurityGroup, Subnet, Tag,
};
use async_trait::async_trait;
use std::sync::Arc;

/// Entry point into a provider's control plane
///
/// A gateway knows which regions exist and hands out clients bound to one
/// region each. Everything that touches resources goes through a
/// [`RegionClient`].
#[async_trait]
pub trait CloudGateway: Send + Sync {
    /// Returns the provider name (e.g., "aws")
    fn name(&self) -> &str;

    /// List every region the credentials can see
    async fn describe_regions(&self) -> Result<Vec<Region>>;

    /// Get a client bound to `region`
    fn region_client(&self, region: &Region) -> Arc<dyn RegionClient>;
}

/// Control-plane operations scoped to a single region
///
/// All calls are remote and may fail transiently.
#[async_trait]
pub trait RegionClient: Send + Sync {
    fn region(&self) -> &Region;

    async fn describe_networks(&self) -> Result<Vec<Network>>;

    async fn describe_subnets(&self) -> Result<Vec<Subnet>>;

    async fn describe_route_tables(&self) -> Result<Vec<RouteTable>>;

    /// Add a route in `route_table_id` sending `destination_cidr` to an instance
    async fn create_route(
        &self,
        route_table_id: &str,
        destination_cidr: &str,
        instance_id: &str,
    ) -> Result<()>;

    async fn delete_route(&self, route_table_id: &str, destination_cidr: &str) -> Result<()>;

    async fn describe_security_groups(&self) -> Result<Vec<SecurityGroup>>;

    /// Create a security group and return its id
    async fn create_security_group(
        &self,
        name: &str,
        description: &str,
        network_id: &str,
    ) -> Result<String>;

    async fn authorize_ingress(&self, group_id: &str, rules: &[IngressRule]) -> Result<()>;

    async fn delete_security_group(&self, group_id: &str) -> Result<()>;

    async fn allocate_address(&self) -> Result<Address>;

    async fn associate_address(&self, allocation_id: &str, instance_id: &str) -> Result<()>;

    async fn release_address(&self, allocation_id: &str) -> Result<()>;

    async fn describe_addresses(&self) -> Result<Vec<Address>>;

    /// Network interfaces attached to `instance_id`
    async fn describe_network_interfaces(&self, instance_id: &str)
    -> Result<Vec<NetworkInterface>>;

    async fn set_source_dest_check(&self, interface_id: &str, enabled: bool) -> Result<()>;

    async fn run_instance(&self, request: &LaunchRequest) -> Result<Instance>;

    /// Describe the given instances, or every instance when `ids` is empty
    async fn describe_instances(&self, ids: &[String]) -> Result<Vec<Instance>>;

    async fn terminate_instances(&self, ids: &[String]) -> Result<()>;

    async fn create_tags(&self, resource_id: &str, tags: &[Tag]) -> Result<()>;
}
