//! Resource model shared by every gateway implementation
//!
//! These are provider-neutral views of the control-plane objects vpcmesh
//! reads and writes. Gateway implementations translate their SDK types into
//! these at the boundary.

use serde::{Deserialize, Serialize};

/// Destination block of a default route
pub const DEFAULT_ROUTE: &str = "0.0.0.0/0";

/// An independent deployment zone with its own API endpoint
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Region {
    pub name: String,
    pub endpoint: String,
}

impl Region {
    pub fn new(name: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
        }
    }
}

impl std::fmt::Display for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

/// An isolated virtual network (VPC)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Network {
    pub id: String,
    pub cidr_block: String,
    pub region: String,
}

/// A subdivision of a network with its own address range
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subnet {
    pub id: String,
    pub network_id: String,
    pub cidr_block: String,
    pub available_addresses: u32,
}

/// Route state as reported by the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteState {
    Active,
    Blackhole,
    Unknown,
}

impl RouteState {
    pub fn from_name(name: &str) -> Self {
        match name {
            "active" => Self::Active,
            "blackhole" => Self::Blackhole,
            _ => Self::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    pub destination_cidr: Option<String>,
    pub gateway_id: Option<String>,
    pub instance_id: Option<String>,
    pub state: RouteState,
}

impl Route {
    /// Active default route through an internet gateway
    pub fn is_internet_default(&self) -> bool {
        self.destination_cidr.as_deref() == Some(DEFAULT_ROUTE)
            && self
                .gateway_id
                .as_deref()
                .is_some_and(|gw| gw.starts_with("igw-"))
            && self.state == RouteState::Active
    }

    pub fn targets_instance(&self, instance_id: &str) -> bool {
        self.instance_id.as_deref() == Some(instance_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteTableAssociation {
    pub subnet_id: Option<String>,
    pub main: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteTable {
    pub id: String,
    pub network_id: String,
    pub routes: Vec<Route>,
    pub associations: Vec<RouteTableAssociation>,
}

impl RouteTable {
    /// Whether this is the network's main route table
    pub fn is_main(&self) -> bool {
        self.associations.iter().any(|a| a.main)
    }

    /// Subnets explicitly associated with this table
    pub fn subnet_ids(&self) -> impl Iterator<Item = &str> {
        self.associations
            .iter()
            .filter_map(|a| a.subnet_id.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityGroup {
    pub id: String,
    pub name: String,
    pub network_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
    Icmp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
            Protocol::Icmp => "icmp",
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One ingress permission on a security group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngressRule {
    pub protocol: Protocol,
    /// `-1` for ICMP (all types)
    pub from_port: i32,
    pub to_port: i32,
    pub cidrs: Vec<String>,
}

/// A public address leased from the provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub public_ip: String,
    pub allocation_id: Option<String>,
    pub instance_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceState {
    Pending,
    Running,
    ShuttingDown,
    Terminated,
    Stopping,
    Stopped,
    Unknown,
}

impl InstanceState {
    pub fn from_name(name: &str) -> Self {
        match name {
            "pending" => Self::Pending,
            "running" => Self::Running,
            "shutting-down" => Self::ShuttingDown,
            "terminated" => Self::Terminated,
            "stopping" => Self::Stopping,
            "stopped" => Self::Stopped,
            _ => Self::Unknown,
        }
    }
}

impl std::fmt::Display for InstanceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InstanceState::Pending => write!(f, "pending"),
            InstanceState::Running => write!(f, "running"),
            InstanceState::ShuttingDown => write!(f, "shutting-down"),
            InstanceState::Terminated => write!(f, "terminated"),
            InstanceState::Stopping => write!(f, "stopping"),
            InstanceState::Stopped => write!(f, "stopped"),
            InstanceState::Unknown => write!(f, "unknown"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

impl Tag {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    pub id: String,
    pub state: InstanceState,
    pub network_id: Option<String>,
    pub subnet_id: Option<String>,
    pub tags: Vec<Tag>,
}

impl Instance {
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|t| t.key == key)
            .map(|t| t.value.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkInterface {
    pub id: String,
    pub instance_id: Option<String>,
}

/// Everything needed to launch one gateway instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRequest {
    pub image_id: String,
    pub instance_type: String,
    pub subnet_id: String,
    pub security_group_ids: Vec<String>,
    /// Plain-text payload; gateways apply whatever encoding the provider wants
    pub user_data: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(dest: &str, gateway: Option<&str>, state: RouteState) -> Route {
        Route {
            destination_cidr: Some(dest.to_string()),
            gateway_id: gateway.map(str::to_string),
            instance_id: None,
            state,
        }
    }

    #[test]
    fn test_internet_default_route() {
        assert!(route("0.0.0.0/0", Some("igw-1234"), RouteState::Active).is_internet_default());
        assert!(!route("0.0.0.0/0", Some("igw-1234"), RouteState::Blackhole).is_internet_default());
        assert!(!route("0.0.0.0/0", Some("vgw-1234"), RouteState::Active).is_internet_default());
        assert!(!route("0.0.0.0/0", None, RouteState::Active).is_internet_default());
        assert!(!route("10.0.0.0/16", Some("local"), RouteState::Active).is_internet_default());
    }

    #[test]
    fn test_instance_state_names() {
        assert_eq!(InstanceState::from_name("running"), InstanceState::Running);
        assert_eq!(InstanceState::from_name("shutting-down"), InstanceState::ShuttingDown);
        assert_eq!(InstanceState::from_name("rebooting"), InstanceState::Unknown);
        assert_eq!(InstanceState::Terminated.to_string(), "terminated");
    }
}
