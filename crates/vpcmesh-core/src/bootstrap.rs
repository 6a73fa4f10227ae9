//! Gateway bootstrap payload
//!
//! Each gateway boots with a cloud-init document that installs an IPsec
//! daemon and defines one tunnel to every other member of the connection.

use crate::endpoint::Connection;
use crate::error::Result;
use serde::Serialize;
use tera::{Context, Tera};
use uuid::Uuid;

const CLOUD_INIT_TEMPLATE: &str = "cloud-init.yaml";

/// One side of a tunnel
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TunnelSide {
    pub network_id: String,
    pub cidr: String,
    pub public_ip: String,
    pub region: String,
}

/// Everything a renderer may use for one gateway
#[derive(Debug, Clone, Serialize)]
pub struct BootstrapContext {
    pub connection_id: String,
    pub pre_shared_key: String,
    pub local: TunnelSide,
    pub peers: Vec<TunnelSide>,
}

impl BootstrapContext {
    /// Contexts for every endpoint that has an address, keyed like the
    /// connection's endpoint map
    pub fn for_connection(connection: &Connection, pre_shared_key: &str) -> Vec<Self> {
        let sides: Vec<TunnelSide> = connection
            .endpoints()
            .filter_map(|e| {
                Some(TunnelSide {
                    network_id: e.network.id.clone(),
                    cidr: e.network.cidr_block.clone(),
                    public_ip: e.public_ip()?.to_string(),
                    region: e.region.name.clone(),
                })
            })
            .collect();

        sides
            .iter()
            .map(|local| Self {
                connection_id: connection.id.clone(),
                pre_shared_key: pre_shared_key.to_string(),
                local: local.clone(),
                peers: sides
                    .iter()
                    .filter(|s| s.network_id != local.network_id)
                    .cloned()
                    .collect(),
            })
            .collect()
    }
}

/// Produces the plain-text user data for a gateway
pub trait UserDataRenderer: Send + Sync {
    fn render(&self, context: &BootstrapContext) -> Result<String>;
}

/// Renders the embedded cloud-init template
pub struct CloudInitRenderer {
    tera: Tera,
}

impl CloudInitRenderer {
    pub fn new() -> Result<Self> {
        let mut tera = Tera::default();
        tera.add_raw_template(
            CLOUD_INIT_TEMPLATE,
            include_str!("../templates/cloud-init.yaml.tera"),
        )?;
        Ok(Self { tera })
    }
}

impl UserDataRenderer for CloudInitRenderer {
    fn render(&self, context: &BootstrapContext) -> Result<String> {
        let context = Context::from_serialize(context)?;
        Ok(self.tera.render(CLOUD_INIT_TEMPLATE, &context)?)
    }
}

/// Random pre-shared key, one per connection
pub fn generate_pre_shared_key() -> String {
    format!(
        "{}{}",
        Uuid::new_v4().simple(),
        Uuid::new_v4().simple()
    )
}
