//! Error types for network policy validation.

use crate::tier::Tier;
use thiserror::Error;

/// Errors raised by security topology and subnet validation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// An edge breaks the tier layering
    #[error("security layering violation on edge {edge}: {reason}")]
    SecurityLayeringViolation {
        /// The offending edge, rendered for humans
        edge: String,
        /// What rule it breaks
        reason: String,
    },

    #[error("invalid CIDR notation: {0}")]
    InvalidCidr(String),

    #[error("invalid prefix length: {0} (must be 0-32)")]
    InvalidPrefixLength(u8),

    #[error("invalid port range {from}-{to}")]
    InvalidPortRange { from: u16, to: u16 },

    /// Two subnets share addresses
    #[error("subnet {first} overlaps {second}")]
    OverlappingCidr { first: String, second: String },

    /// A subnet is not strictly inside the VPC
    #[error("subnet {cidr} is not inside VPC {vpc}")]
    OutsideVpc { cidr: String, vpc: String },

    #[error("{tier} tier needs at least {required} subnets, got {count}")]
    InsufficientSubnets {
        tier: Tier,
        count: usize,
        required: usize,
    },

    #[error("{tier} tier needs subnets in at least {required} availability zones, got {count}")]
    InsufficientZones {
        tier: Tier,
        count: usize,
        required: usize,
    },

    #[error("no availability zones given")]
    EmptyZones,

    #[error("unknown tier: {0}")]
    UnknownTier(String),
}

impl Error {
    pub(crate) fn violation(edge: impl ToString, reason: impl Into<String>) -> Self {
        Self::SecurityLayeringViolation {
            edge: edge.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result type for network policy operations.
pub type Result<T> = std::result::Result<T, Error>;
