//! vpcmesh core engine
//!
//! Builds and tears down full-mesh IPsec overlays between VPCs, possibly in
//! different regions. There is no local state: a connection exists only as
//! tags on its gateway instances, and [`directory`] rebuilds the picture from
//! a fresh scan every time.
//!
//! # Flow
//!
//! ```text
//! create: tokens ─▶ resolver ─▶ subnet selector ─▶ saga ─┬─▶ done
//!                    (topology index via fan-out)         └─▶ rollback
//! list:   fan-out ─▶ directory
//! delete: fan-out ─▶ directory ─▶ rollback
//! ```

pub mod bootstrap;
pub mod directory;
pub mod endpoint;
pub mod error;
pub mod fanout;
pub mod firewall;
pub mod poller;
pub mod resolver;
pub mod rollback;
pub mod saga;
pub mod service;
pub mod subnet;
pub mod tags;
pub mod topology;

pub use bootstrap::{BootstrapContext, CloudInitRenderer, TunnelSide, UserDataRenderer};
pub use directory::{ConnectionDirectory, DirectoryScan};
pub use endpoint::{Connection, VpnEndpoint};
pub use error::{MeshError, ResolutionError, Result, SubnetSelectionError};
pub use fanout::{FanOut, FanOutResult, RegionFailure};
pub use poller::{PollOutcome, PollTarget, Poller};
pub use rollback::{Rollback, RollbackReport};
pub use saga::{Compensation, Phase, Provisioner, SagaLog, SagaSettings};
pub use service::MeshService;
pub use tags::ConnectionTags;
pub use topology::TopologyIndex;
