//! Connection directory rebuilt from instance tags
//!
//! Nothing is cached: each scan describes every running instance in every
//! region, groups the tagged ones by connection id, then fills in networks,
//! subnets, security groups and addresses from the regions involved.

use crate::endpoint::{Connection, VpnEndpoint};
use crate::fanout::{FanOut, RegionFailure};
use crate::tags::ConnectionTags;
use std::collections::{BTreeMap, BTreeSet};
use vpcmesh_cloud::{
    Address, CloudError, Instance, InstanceState, Network, Region, SecurityGroup, Subnet,
};

/// Result of one directory scan
#[derive(Debug)]
pub struct DirectoryScan {
    pub connections: BTreeMap<String, Connection>,
    /// Regions that could not be queried; their members are missing
    pub failures: Vec<RegionFailure>,
}

impl DirectoryScan {
    pub fn get(&self, id: &str) -> Option<&Connection> {
        self.connections.get(id)
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Per-region resources needed to complete endpoints
#[derive(Debug, Default)]
struct RegionInventory {
    networks: Vec<Network>,
    subnets: Vec<Subnet>,
    security_groups: Vec<SecurityGroup>,
    addresses: Vec<Address>,
}

/// A tagged instance found during the scan
struct Member {
    region: String,
    network_id: String,
    instance: Instance,
    tags: ConnectionTags,
}

pub struct ConnectionDirectory {
    fanout: FanOut,
}

impl ConnectionDirectory {
    pub fn new(fanout: FanOut) -> Self {
        Self { fanout }
    }

    pub async fn scan(&self, regions: &[Region]) -> DirectoryScan {
        let instances = self
            .fanout
            .query(regions, "instances", |client| async move {
                client.describe_instances(&[]).await
            })
            .await;
        let mut failures = instances.failures;

        let mut members = Vec::new();
        for (region, found) in instances.by_region {
            for instance in found {
                if instance.state != InstanceState::Running {
                    continue;
                }
                match ConnectionTags::from_tags(&instance.tags) {
                    Ok(Some(tags)) => {
                        let Some(network_id) = instance.network_id.clone() else {
                            tracing::warn!(
                                instance_id = %instance.id,
                                region = %region,
                                connection_id = %tags.id,
                                "Skipping connection instance outside any network"
                            );
                            continue;
                        };
                        members.push(Member {
                            region: region.clone(),
                            network_id,
                            instance,
                            tags,
                        });
                    }
                    Ok(None) => {}
                    Err(err) => {
                        tracing::warn!(
                            instance_id = %instance.id,
                            region = %region,
                            error = %err,
                            "Skipping instance with malformed connection tags"
                        );
                    }
                }
            }
        }

        let involved: Vec<Region> = {
            let names: BTreeSet<&str> = members.iter().map(|m| m.region.as_str()).collect();
            regions
                .iter()
                .filter(|r| names.contains(r.name.as_str()))
                .cloned()
                .collect()
        };

        let inventories = self
            .fanout
            .query(&involved, "inventory", |client| async move {
                Ok::<_, CloudError>(RegionInventory {
                    networks: client.describe_networks().await?,
                    subnets: client.describe_subnets().await?,
                    security_groups: client.describe_security_groups().await?,
                    addresses: client.describe_addresses().await?,
                })
            })
            .await;
        failures.extend(inventories.failures);

        let empty = RegionInventory::default();
        let mut connections: BTreeMap<String, Connection> = BTreeMap::new();
        for member in members {
            let Some(region) = regions.iter().find(|r| r.name == member.region) else {
                continue;
            };
            let inventory = inventories.by_region.get(&member.region).unwrap_or(&empty);
            let endpoint = build_endpoint(region, &member, inventory);

            connections
                .entry(member.tags.id.clone())
                .or_insert_with(|| Connection::new(&member.tags.id, member.tags.created_on, []))
                .endpoints
                .insert(endpoint.network.id.clone(), endpoint);
        }

        for connection in connections.values() {
            let expected = members_expected(connection);
            if expected != connection.len() {
                tracing::warn!(
                    connection_id = %connection.id,
                    found = connection.len(),
                    expected,
                    "Connection is missing members"
                );
            }
        }

        tracing::debug!(connections = connections.len(), "Directory scan complete");
        DirectoryScan {
            connections,
            failures,
        }
    }
}

fn build_endpoint(region: &Region, member: &Member, inventory: &RegionInventory) -> VpnEndpoint {
    let instance = &member.instance;
    let network_id = &member.network_id;

    let network = inventory
        .networks
        .iter()
        .find(|n| &n.id == network_id)
        .cloned()
        .unwrap_or_else(|| {
            tracing::warn!(network_id = %network_id, instance_id = %instance.id, "Network not found");
            Network {
                id: network_id.clone(),
                cidr_block: String::new(),
                region: region.name.clone(),
            }
        });

    let token = network.id.clone();
    let mut endpoint = VpnEndpoint::new(token, region.clone(), network);
    endpoint.subnet = instance
        .subnet_id
        .as_deref()
        .and_then(|id| inventory.subnets.iter().find(|s| s.id == id))
        .cloned();
    endpoint.security_group_id = inventory
        .security_groups
        .iter()
        .find(|g| g.name == member.tags.id && g.network_id.as_ref() == Some(network_id))
        .map(|g| g.id.clone());
    endpoint.address = member.tags.public_ip.as_deref().map(|ip| {
        inventory
            .addresses
            .iter()
            .find(|a| a.public_ip == ip)
            .cloned()
            .unwrap_or_else(|| Address {
                public_ip: ip.to_string(),
                allocation_id: None,
                instance_id: None,
            })
    });
    endpoint.instance = Some(instance.clone());
    endpoint
}

/// Member count recorded in the tags of any member
fn members_expected(connection: &Connection) -> usize {
    connection
        .endpoints()
        .filter_map(|e| e.instance.as_ref())
        .filter_map(|i| ConnectionTags::from_tags(&i.tags).ok().flatten())
        .map(|t| t.network_ids.len())
        .max()
        .unwrap_or(0)
}
