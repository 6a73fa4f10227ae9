pub mod create;
pub mod delete;
pub mod list;

use vpcmesh_core::VpnEndpoint;

/// `<cidr>/<network-id>(<region>)`
pub fn describe_endpoint(endpoint: &VpnEndpoint) -> String {
    format!(
        "{}/{}({})",
        endpoint.network.cidr_block, endpoint.network.id, endpoint.region.name
    )
}
