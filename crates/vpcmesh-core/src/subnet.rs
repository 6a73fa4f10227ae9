//! Public subnet discovery and selection
//!
//! A subnet is public when the route table governing it has an active
//! `0.0.0.0/0` route through an internet gateway. Subnets without an explicit
//! association are governed by the network's main table.

use crate::endpoint::VpnEndpoint;
use crate::error::{MeshError, Result, SubnetSelectionError};
use crate::topology::TopologyIndex;
use std::collections::HashSet;

/// Ids of the public subnets of a network
///
/// Order follows the route tables as the provider returned them, then their
/// explicit associations; implicitly associated subnets of a public main
/// table come last, by id.
pub fn public_subnet_ids(network_id: &str, index: &TopologyIndex) -> Vec<String> {
    let tables = index.route_tables(network_id);
    let explicitly_associated: HashSet<&str> = tables.iter().flat_map(|t| t.subnet_ids()).collect();

    let mut public = Vec::new();
    for table in tables {
        if !table.routes.iter().any(|r| r.is_internet_default()) {
            continue;
        }
        for subnet_id in table.subnet_ids() {
            if !public.iter().any(|id| id == subnet_id) {
                public.push(subnet_id.to_string());
            }
        }
        if table.is_main() {
            for subnet in index.subnets_in(network_id) {
                if !explicitly_associated.contains(subnet.id.as_str())
                    && !public.contains(&subnet.id)
                {
                    public.push(subnet.id.clone());
                }
            }
        }
    }
    public
}

/// Confirm the endpoint's subnet is public, or pick one
///
/// A non-public subnet named by the operator is cleared from the endpoint
/// and reported.
pub fn select_public_subnet(
    endpoint: &mut VpnEndpoint,
    index: &TopologyIndex,
) -> std::result::Result<(), SubnetSelectionError> {
    let network_id = endpoint.network.id.clone();
    let public = public_subnet_ids(&network_id, index);

    if let Some(subnet) = &endpoint.subnet {
        if public.contains(&subnet.id) {
            return Ok(());
        }
        let subnet_id = subnet.id.clone();
        endpoint.subnet = None;
        return Err(SubnetSelectionError::NotPublic {
            network_id,
            subnet_id,
        });
    }

    if public.is_empty() {
        return Err(SubnetSelectionError::NoPublicSubnet { network_id });
    }

    let chosen = public
        .iter()
        .filter_map(|id| index.subnet(id))
        .find(|s| s.available_addresses > 0)
        .ok_or(SubnetSelectionError::NoFreeAddresses {
            network_id: network_id.clone(),
        })?;

    tracing::debug!(
        network_id = %network_id,
        subnet_id = %chosen.id,
        available = chosen.available_addresses,
        "Selected public subnet"
    );
    endpoint.subnet = Some(chosen.clone());
    Ok(())
}

/// Run selection for every endpoint and report all failures together
pub fn select_public_subnets(endpoints: &mut [VpnEndpoint], index: &TopologyIndex) -> Result<()> {
    let errors: Vec<_> = endpoints
        .iter_mut()
        .filter_map(|e| select_public_subnet(e, index).err())
        .collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(MeshError::TopologyValidation(errors))
    }
}
