use crate::saga::Phase;
use thiserror::Error;
use vpcmesh_cloud::CloudError;
use vpcmesh_config::ConfigError;

/// Why one endpoint token could not be turned into a network
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("'{0}' is not a network id (vpc-...), subnet id (subnet-...) or IPv4 CIDR block")]
    Unrecognized(String),

    #[error("No network or subnet matches '{0}'")]
    NotFound(String),

    #[error("'{token}' matches more than one {kind}: {}; use an id instead", .candidates.join(", "))]
    Ambiguous {
        token: String,
        kind: &'static str,
        candidates: Vec<String>,
    },

    #[error("'{first}' and '{second}' refer to the same or overlapping networks ({first_network}, {second_network})")]
    Duplicate {
        first: String,
        second: String,
        first_network: String,
        second_network: String,
    },
}

/// Why no usable public subnet could be fixed for an endpoint
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubnetSelectionError {
    #[error("Subnet {subnet_id} in {network_id} has no default route through an internet gateway")]
    NotPublic {
        network_id: String,
        subnet_id: String,
    },

    #[error("Network {network_id} has no public subnet")]
    NoPublicSubnet { network_id: String },

    #[error("No public subnet in {network_id} has free addresses")]
    NoFreeAddresses { network_id: String },
}

#[derive(Error, Debug)]
pub enum MeshError {
    #[error("A connection needs at least 2 endpoints, got {0}")]
    NotEnoughEndpoints(usize),

    #[error("Endpoint resolution failed:\n{}", join_lines(.0))]
    Resolution(Vec<ResolutionError>),

    #[error("Topology validation failed:\n{}", join_lines(.0))]
    TopologyValidation(Vec<SubnetSelectionError>),

    #[error(
        "Route table {route_table_id} in {network_id} already routes {destination}; the networks look connected already"
    )]
    PreExistingRoute {
        route_table_id: String,
        network_id: String,
        destination: String,
    },

    #[error("No gateway image configured for region {region} (set images.{region} in vpcmesh.yaml)")]
    MissingImage { region: String },

    #[error("{phase} failed: {source}")]
    ProvisioningStep {
        phase: Phase,
        #[source]
        source: CloudError,
    },

    #[error("Instances not running before the deadline: {}", .pending.join(", "))]
    InstancesNotReady { pending: Vec<String> },

    #[error("Connection not found: {0}")]
    ConnectionNotFound(String),

    #[error("Bootstrap template error: {0}")]
    Template(#[from] tera::Error),

    #[error(transparent)]
    Cloud(#[from] CloudError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl MeshError {
    /// Raised before any resource was created
    pub fn is_pre_mutation(&self) -> bool {
        matches!(
            self,
            Self::NotEnoughEndpoints(_)
                | Self::Resolution(_)
                | Self::TopologyValidation(_)
                | Self::PreExistingRoute { .. }
                | Self::MissingImage { .. }
        )
    }
}

fn join_lines<T: std::fmt::Display>(errors: &[T]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {e}"))
        .collect::<Vec<_>>()
        .join("\n")
}

pub type Result<T> = std::result::Result<T, MeshError>;
