//! EC2 gateway for vpcmesh
//!
//! Implements [`vpcmesh_cloud::CloudGateway`] on top of the official AWS SDK.
//! One [`Ec2Gateway`] is built from the ambient credential chain and hands out
//! an [`Ec2RegionClient`] per region, each with its own regional endpoint.
//!
//! # Requirements
//!
//! - AWS credentials resolvable by the default provider chain
//!   (environment, shared profile, SSO or instance metadata)
//!
//! # Example
//!
//! ```ignore
//! use vpcmesh_cloud::CloudGateway;
//! use vpcmesh_cloud_aws::Ec2Gateway;
//!
//! let gateway = Ec2Gateway::from_env().await;
//! for region in gateway.describe_regions().await? {
//!     let client = gateway.region_client(&region);
//!     let networks = client.describe_networks().await?;
//! }
//! ```

mod convert;
pub mod error;
pub mod gateway;

pub use gateway::{Ec2Gateway, Ec2RegionClient};
