//! Connection tag codec
//!
//! Tags on the gateway instances are the only record of a connection. The
//! wire format keeps member lists comma-joined; they are split into typed
//! fields here and nowhere else.

use crate::endpoint::Connection;
use chrono::{DateTime, Utc};
use thiserror::Error;
use vpcmesh_cloud::Tag;

pub const NAME: &str = "Name";
pub const CONNECTION_ID: &str = "connection:id";
pub const CREATED_ON: &str = "connection:created_on";
pub const NETWORK_ID_LIST: &str = "connection:network_id_list";
pub const SUBNET_ID_LIST: &str = "connection:subnet_id_list";
pub const PUBLIC_IP_LIST: &str = "connection:public_ip_list";
pub const PUBLIC_IP: &str = "connection:public_ip";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TagParseError {
    #[error("missing tag {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

/// Decoded connection tags of one instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionTags {
    pub id: String,
    pub created_on: DateTime<Utc>,
    pub network_ids: Vec<String>,
    pub subnet_ids: Vec<String>,
    pub public_ips: Vec<String>,
    /// The tagged instance's own address
    pub public_ip: Option<String>,
}

impl ConnectionTags {
    /// Shared tag values for every member of `connection`
    pub fn for_connection(connection: &Connection) -> Self {
        let endpoints: Vec<_> = connection.endpoints().collect();
        Self {
            id: connection.id.clone(),
            created_on: connection.created_on,
            network_ids: endpoints.iter().map(|e| e.network.id.clone()).collect(),
            subnet_ids: endpoints
                .iter()
                .filter_map(|e| e.subnet_id().map(str::to_string))
                .collect(),
            public_ips: endpoints
                .iter()
                .filter_map(|e| e.public_ip().map(str::to_string))
                .collect(),
            public_ip: None,
        }
    }

    /// Full tag set for one instance
    pub fn to_tags(&self, name: &str, own_public_ip: Option<&str>) -> Vec<Tag> {
        let mut tags = vec![
            Tag::new(NAME, name),
            Tag::new(CONNECTION_ID, &self.id),
            Tag::new(CREATED_ON, self.created_on.timestamp_millis().to_string()),
            Tag::new(NETWORK_ID_LIST, self.network_ids.join(",")),
            Tag::new(SUBNET_ID_LIST, self.subnet_ids.join(",")),
            Tag::new(PUBLIC_IP_LIST, self.public_ips.join(",")),
        ];
        if let Some(ip) = own_public_ip.or(self.public_ip.as_deref()) {
            tags.push(Tag::new(PUBLIC_IP, ip));
        }
        tags
    }

    /// Decode an instance's tags
    ///
    /// `Ok(None)` means the instance carries no connection id and is not
    /// managed by vpcmesh.
    pub fn from_tags(tags: &[Tag]) -> Result<Option<Self>, TagParseError> {
        let get = |key: &str| tags.iter().find(|t| t.key == key).map(|t| t.value.as_str());

        let Some(id) = get(CONNECTION_ID).filter(|v| !v.is_empty()) else {
            return Ok(None);
        };

        let created_raw = get(CREATED_ON).ok_or(TagParseError::Missing(CREATED_ON))?;
        let created_on = created_raw
            .trim()
            .parse::<i64>()
            .ok()
            .and_then(DateTime::from_timestamp_millis)
            .ok_or_else(|| TagParseError::Invalid {
                key: CREATED_ON,
                value: created_raw.to_string(),
            })?;

        let network_ids =
            split_list(get(NETWORK_ID_LIST).ok_or(TagParseError::Missing(NETWORK_ID_LIST))?);
        if network_ids.is_empty() {
            return Err(TagParseError::Invalid {
                key: NETWORK_ID_LIST,
                value: String::new(),
            });
        }

        Ok(Some(Self {
            id: id.to_string(),
            created_on,
            network_ids,
            subnet_ids: get(SUBNET_ID_LIST).map(split_list).unwrap_or_default(),
            public_ips: get(PUBLIC_IP_LIST).map(split_list).unwrap_or_default(),
            public_ip: get(PUBLIC_IP)
                .filter(|v| !v.is_empty())
                .map(str::to_string),
        }))
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect()
}
