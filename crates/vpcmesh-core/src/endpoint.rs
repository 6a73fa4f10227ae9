//! Endpoints and connections

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use uuid::Uuid;
use vpcmesh_cloud::{Address, Instance, Network, Region, Subnet};

/// Prefix of every generated connection id
pub const CONNECTION_ID_PREFIX: &str = "vpcmesh-";

/// One participant of a mesh connection
///
/// Built by the resolver with only region, network and (maybe) subnet set;
/// the provisioning phases fill in the rest.
#[derive(Debug, Clone, PartialEq)]
pub struct VpnEndpoint {
    /// Token the operator supplied, or the network id for rediscovered endpoints
    pub token: String,
    pub region: Region,
    pub network: Network,
    pub subnet: Option<Subnet>,
    pub security_group_id: Option<String>,
    pub address: Option<Address>,
    pub instance: Option<Instance>,
}

impl VpnEndpoint {
    pub fn new(token: impl Into<String>, region: Region, network: Network) -> Self {
        Self {
            token: token.into(),
            region,
            network,
            subnet: None,
            security_group_id: None,
            address: None,
            instance: None,
        }
    }

    pub fn with_subnet(mut self, subnet: Subnet) -> Self {
        self.subnet = Some(subnet);
        self
    }

    pub fn network_id(&self) -> &str {
        &self.network.id
    }

    pub fn subnet_id(&self) -> Option<&str> {
        self.subnet.as_ref().map(|s| s.id.as_str())
    }

    pub fn public_ip(&self) -> Option<&str> {
        self.address.as_ref().map(|a| a.public_ip.as_str())
    }

    pub fn allocation_id(&self) -> Option<&str> {
        self.address
            .as_ref()
            .and_then(|a| a.allocation_id.as_deref())
    }

    pub fn instance_id(&self) -> Option<&str> {
        self.instance.as_ref().map(|i| i.id.as_str())
    }
}

/// A full mesh of endpoints sharing one connection id
#[derive(Debug, Clone, PartialEq)]
pub struct Connection {
    pub id: String,
    pub created_on: DateTime<Utc>,
    /// Keyed by network id
    pub endpoints: BTreeMap<String, VpnEndpoint>,
}

impl Connection {
    pub fn new(
        id: impl Into<String>,
        created_on: DateTime<Utc>,
        endpoints: impl IntoIterator<Item = VpnEndpoint>,
    ) -> Self {
        Self {
            id: id.into(),
            created_on,
            endpoints: endpoints
                .into_iter()
                .map(|e| (e.network.id.clone(), e))
                .collect(),
        }
    }

    /// Start a brand new connection with a fresh id
    pub fn generate(endpoints: impl IntoIterator<Item = VpnEndpoint>) -> Self {
        Self::new(new_connection_id(), now_millis(), endpoints)
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    pub fn endpoints(&self) -> impl Iterator<Item = &VpnEndpoint> {
        self.endpoints.values()
    }
}

/// `vpcmesh-` followed by 8 random hex characters
pub fn new_connection_id() -> String {
    let uuid = Uuid::new_v4().simple().to_string();
    format!("{CONNECTION_ID_PREFIX}{}", &uuid[..8])
}

/// Current time truncated to whole milliseconds, the precision tags carry
pub fn now_millis() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now)
}
