//! Point-in-time view of every network in every region

use crate::fanout::{FanOut, RegionFailure};
use ipnetwork::Ipv4Network;
use std::collections::{BTreeMap, HashMap};
use vpcmesh_cloud::{CloudError, Network, Region, RouteTable, Subnet};

/// Lookup tables the resolver and subnet selector work from
#[derive(Debug, Default)]
pub struct TopologyIndex {
    regions: BTreeMap<String, Region>,
    networks: BTreeMap<String, Network>,
    subnets: BTreeMap<String, Subnet>,
    route_tables: HashMap<String, Vec<RouteTable>>,
}

/// What one region contributes to the index
struct RegionTopology {
    networks: Vec<Network>,
    subnets: Vec<Subnet>,
    route_tables: Vec<RouteTable>,
}

impl TopologyIndex {
    pub fn new(
        regions: impl IntoIterator<Item = Region>,
        networks: impl IntoIterator<Item = Network>,
        subnets: impl IntoIterator<Item = Subnet>,
        route_tables: impl IntoIterator<Item = RouteTable>,
    ) -> Self {
        let mut index = Self {
            regions: regions.into_iter().map(|r| (r.name.clone(), r)).collect(),
            networks: networks.into_iter().map(|n| (n.id.clone(), n)).collect(),
            subnets: subnets.into_iter().map(|s| (s.id.clone(), s)).collect(),
            route_tables: HashMap::new(),
        };
        for table in route_tables {
            index
                .route_tables
                .entry(table.network_id.clone())
                .or_default()
                .push(table);
        }
        index
    }

    /// Describe networks, subnets and route tables in every region
    ///
    /// One fan-out; within a region the three calls run one after another so
    /// the worker count bounds the requests in flight. Regions that fail are
    /// logged and returned; their networks are simply absent from the index.
    pub async fn load(fanout: &FanOut, regions: &[Region]) -> (Self, Vec<RegionFailure>) {
        let result = fanout
            .query(regions, "topology", |client| async move {
                Ok::<_, CloudError>(RegionTopology {
                    networks: client.describe_networks().await?,
                    subnets: client.describe_subnets().await?,
                    route_tables: client.describe_route_tables().await?,
                })
            })
            .await;

        let mut networks = Vec::new();
        let mut subnets = Vec::new();
        let mut route_tables = Vec::new();
        for topology in result.by_region.into_values() {
            networks.extend(topology.networks);
            subnets.extend(topology.subnets);
            route_tables.extend(topology.route_tables);
        }

        let index = Self::new(regions.iter().cloned(), networks, subnets, route_tables);
        tracing::debug!(
            networks = index.networks.len(),
            subnets = index.subnets.len(),
            "Topology loaded"
        );
        (index, result.failures)
    }

    pub fn network(&self, id: &str) -> Option<&Network> {
        self.networks.get(id)
    }

    pub fn subnet(&self, id: &str) -> Option<&Subnet> {
        self.subnets.get(id)
    }

    pub fn region(&self, name: &str) -> Option<&Region> {
        self.regions.get(name)
    }

    /// Region the network lives in
    pub fn region_of(&self, network: &Network) -> Option<&Region> {
        self.regions.get(&network.region)
    }

    /// Route tables owned by a network, in provider order
    pub fn route_tables(&self, network_id: &str) -> &[RouteTable] {
        self.route_tables
            .get(network_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Subnets of a network, ordered by id
    pub fn subnets_in(&self, network_id: &str) -> Vec<&Subnet> {
        self.subnets
            .values()
            .filter(|s| s.network_id == network_id)
            .collect()
    }

    /// Networks whose address block is exactly `cidr`
    pub fn networks_with_cidr(&self, cidr: Ipv4Network) -> Vec<&Network> {
        self.networks
            .values()
            .filter(|n| parse_cidr(&n.cidr_block) == Some(cidr))
            .collect()
    }

    /// Subnets whose address block is exactly `cidr`
    pub fn subnets_with_cidr(&self, cidr: Ipv4Network) -> Vec<&Subnet> {
        self.subnets
            .values()
            .filter(|s| parse_cidr(&s.cidr_block) == Some(cidr))
            .collect()
    }
}

/// Parse a CIDR block, normalising host bits away
pub fn parse_cidr(value: &str) -> Option<Ipv4Network> {
    let parsed: Ipv4Network = value.trim().parse().ok()?;
    Ipv4Network::new(parsed.network(), parsed.prefix()).ok()
}

/// Whether two address blocks share any address
pub fn cidrs_overlap(a: Ipv4Network, b: Ipv4Network) -> bool {
    a.contains(b.network()) || b.contains(a.network())
}
