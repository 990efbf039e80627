//! Traffic-isolation tiers

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A traffic-isolation layer with its own security group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Internet-facing load balancers
    Public,
    /// Bastion hosts; a management plane beside the public tier
    Admin,
    /// Private application nodes
    App,
    /// Private databases
    Db,
}

impl Tier {
    /// Every tier, in declaration order
    pub const ALL: [Self; 4] = [Self::Public, Self::Admin, Self::App, Self::Db];

    /// Tiers that own subnets
    pub const SUBNET_TIERS: [Self; 3] = [Self::Public, Self::App, Self::Db];

    /// Privacy rank: higher is more private
    pub fn rank(self) -> u8 {
        match self {
            Self::Public | Self::Admin => 0,
            Self::App => 1,
            Self::Db => 2,
        }
    }

    /// Whether addresses outside the VPC may reach this tier
    pub fn accepts_external(self) -> bool {
        matches!(self, Self::Public | Self::Admin)
    }

    /// Stable lowercase name
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Admin => "admin",
            Self::App => "app",
            Self::Db => "db",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public" => Ok(Self::Public),
            "admin" => Ok(Self::Admin),
            "app" => Ok(Self::App),
            "db" => Ok(Self::Db),
            other => Err(Error::UnknownTier(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_orders_privacy() {
        assert!(Tier::Public.rank() < Tier::App.rank());
        assert!(Tier::App.rank() < Tier::Db.rank());
        assert_eq!(Tier::Admin.rank(), Tier::Public.rank());
    }

    #[test]
    fn test_parse() {
        assert_eq!("db".parse::<Tier>().unwrap(), Tier::Db);
        assert!("dmz".parse::<Tier>().is_err());
    }
}
