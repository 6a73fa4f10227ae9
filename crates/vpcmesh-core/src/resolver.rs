//! Endpoint token resolution
//!
//! Tokens are classified by shape, in this order: network id (`vpc-...`),
//! subnet id (`subnet-...`), IPv4 CIDR block. Resolution is all or nothing:
//! every token's problem is collected and reported together, and duplicate
//! detection only runs once each token resolved on its own.

use crate::endpoint::VpnEndpoint;
use crate::error::{MeshError, ResolutionError, Result};
use crate::topology::{TopologyIndex, cidrs_overlap, parse_cidr};
use ipnetwork::Ipv4Network;
use vpcmesh_cloud::{Network, Subnet};

const NETWORK_PREFIX: &str = "vpc-";
const SUBNET_PREFIX: &str = "subnet-";

/// A classified endpoint token
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointToken {
    Network(String),
    Subnet(String),
    Cidr(Ipv4Network),
}

impl EndpointToken {
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if is_resource_id(raw, NETWORK_PREFIX) {
            return Some(Self::Network(raw.to_string()));
        }
        if is_resource_id(raw, SUBNET_PREFIX) {
            return Some(Self::Subnet(raw.to_string()));
        }
        // a bare address would parse as a /32
        if raw.contains('/') {
            return parse_cidr(raw).map(Self::Cidr);
        }
        None
    }
}

fn is_resource_id(raw: &str, prefix: &str) -> bool {
    raw.strip_prefix(prefix)
        .is_some_and(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_alphanumeric()))
}

/// Resolve every token against the index
pub fn resolve(tokens: &[String], index: &TopologyIndex) -> Result<Vec<VpnEndpoint>> {
    let mut endpoints = Vec::with_capacity(tokens.len());
    let mut errors = Vec::new();

    for token in tokens {
        match resolve_token(token, index) {
            Ok(endpoint) => endpoints.push(endpoint),
            Err(err) => errors.push(err),
        }
    }

    if errors.is_empty() {
        errors = find_duplicates(&endpoints);
    }
    if !errors.is_empty() {
        return Err(MeshError::Resolution(errors));
    }

    for endpoint in &endpoints {
        tracing::debug!(
            token = %endpoint.token,
            network_id = %endpoint.network.id,
            subnet_id = endpoint.subnet_id().unwrap_or("-"),
            region = %endpoint.region,
            "Resolved endpoint"
        );
    }
    Ok(endpoints)
}

fn resolve_token(
    token: &str,
    index: &TopologyIndex,
) -> std::result::Result<VpnEndpoint, ResolutionError> {
    let not_found = || ResolutionError::NotFound(token.to_string());

    let (network, subnet) = match EndpointToken::parse(token) {
        Some(EndpointToken::Network(id)) => (index.network(&id).ok_or_else(not_found)?, None),
        Some(EndpointToken::Subnet(id)) => {
            let subnet = index.subnet(&id).ok_or_else(not_found)?;
            let network = index.network(&subnet.network_id).ok_or_else(not_found)?;
            (network, Some(subnet))
        }
        Some(EndpointToken::Cidr(cidr)) => resolve_cidr(token, cidr, index)?,
        None => return Err(ResolutionError::Unrecognized(token.to_string())),
    };

    let region = index.region_of(network).ok_or_else(not_found)?;
    let endpoint = VpnEndpoint::new(token, region.clone(), network.clone());
    Ok(match subnet {
        Some(subnet) => endpoint.with_subnet(subnet.clone()),
        None => endpoint,
    })
}

fn resolve_cidr<'a>(
    token: &str,
    cidr: Ipv4Network,
    index: &'a TopologyIndex,
) -> std::result::Result<(&'a Network, Option<&'a Subnet>), ResolutionError> {
    let subnets = index.subnets_with_cidr(cidr);
    if subnets.len() > 1 {
        return Err(ResolutionError::Ambiguous {
            token: token.to_string(),
            kind: "subnet",
            candidates: subnets.iter().map(|s| s.id.clone()).collect(),
        });
    }
    let networks = index.networks_with_cidr(cidr);
    if networks.len() > 1 {
        return Err(ResolutionError::Ambiguous {
            token: token.to_string(),
            kind: "network",
            candidates: networks.iter().map(|n| n.id.clone()).collect(),
        });
    }

    if let Some(subnet) = subnets.first() {
        let network = index
            .network(&subnet.network_id)
            .ok_or_else(|| ResolutionError::NotFound(token.to_string()))?;
        return Ok((network, Some(subnet)));
    }
    match networks.first() {
        Some(network) => Ok((network, None)),
        None => Err(ResolutionError::NotFound(token.to_string())),
    }
}

/// Pairs that share a network id or an overlapping address block
fn find_duplicates(endpoints: &[VpnEndpoint]) -> Vec<ResolutionError> {
    let mut errors = Vec::new();
    for (i, a) in endpoints.iter().enumerate() {
        for b in &endpoints[i + 1..] {
            let same_network = a.network.id == b.network.id;
            let overlapping = match (
                parse_cidr(&a.network.cidr_block),
                parse_cidr(&b.network.cidr_block),
            ) {
                (Some(x), Some(y)) => cidrs_overlap(x, y),
                _ => a.network.cidr_block == b.network.cidr_block,
            };
            if same_network || overlapping {
                errors.push(ResolutionError::Duplicate {
                    first: a.token.clone(),
                    second: b.token.clone(),
                    first_network: a.network.id.clone(),
                    second_network: b.network.id.clone(),
                });
            }
        }
    }
    errors
}
