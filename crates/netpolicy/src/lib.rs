//! # Netpolicy
//!
//! Security topology and subnet layout for a three-tier network.
//!
//! - [`SecurityTopology`]: group-to-group allow-rules over the public, admin,
//!   app and db tiers, checked against the tier layering
//! - [`SubnetPlan`]: per-tier subnet blocks with availability-zone quorum
//! - [`Cidr`]: IPv4 block arithmetic
//!
//! ## Example
//!
//! ```
//! use netpolicy::{Cidr, PortRange, Protocol, SecurityTopology, Tier};
//!
//! let admin: Cidr = "203.0.113.0/24".parse().unwrap();
//! let mut topology = SecurityTopology::three_tier(8080, 5432, &[admin]);
//! assert!(topology.validate().is_ok());
//!
//! // The database may never be reached from the public tier
//! topology.add_edge(Tier::Public, Tier::Db, Protocol::Tcp, PortRange::single(5432));
//! assert!(topology.validate().is_err());
//! ```

pub mod cidr;
pub mod error;
pub mod security;
pub mod subnet;
pub mod tier;

pub use cidr::Cidr;
pub use error::{Error, Result};
pub use security::{EgressPolicy, PortRange, Protocol, SSH_PORT, SecurityEdge, SecurityTopology, Source};
pub use subnet::{MIN_SUBNETS_PER_TIER, MIN_ZONES_PER_TIER, SubnetAllocation, SubnetPlan};
pub use tier::Tier;
