//! vpcmesh cloud abstraction
//!
//! Provider-neutral view of the control plane that vpcmesh drives: regions,
//! networks, subnets, route tables, security groups, public addresses and
//! instances. The provisioning core only ever talks to [`CloudGateway`] and
//! [`RegionClient`], so a test double can stand in for a real provider.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                  vpcmesh CLI                    │
//! │            (create / list / delete)             │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │                 vpcmesh-core                    │
//! │   resolver · saga · rollback · directory        │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │                vpcmesh-cloud                    │
//! │  trait CloudGateway / trait RegionClient        │
//! │  resource model · retry                         │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//!           ┌───────▼───────┐
//!           │ vpcmesh-cloud │
//!           │     -aws      │
//!           └───────────────┘
//! ```

pub mod error;
pub mod gateway;
pub mod model;
pub mod retry;

// Re-exports
pub use error::{CloudError, Result};
pub use gateway::{CloudGateway, RegionClient};
pub use model::{
    Address, DEFAULT_ROUTE, IngressRule, Instance, InstanceState, LaunchRequest, Network,
    NetworkInterface, Protocol, Region, Route, RouteState, RouteTable, RouteTableAssociation,
    SecurityGroup, Subnet, Tag,
};
pub use retry::{RetryConfig, retry};
