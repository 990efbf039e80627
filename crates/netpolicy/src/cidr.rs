//! IPv4 CIDR blocks
//!
//! Invariants:
//! - Prefix length is 0-32
//! - Host bits below the prefix are zero, so every block has one spelling

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

/// An IPv4 network block in CIDR notation
///
/// # Examples
///
/// ```
/// use netpolicy::Cidr;
///
/// let vpc: Cidr = "10.0.0.0/16".parse().unwrap();
/// let subnet: Cidr = "10.0.3.0/24".parse().unwrap();
/// assert!(vpc.contains(&subnet));
/// assert_eq!(vpc.subnet(24, 3).unwrap(), subnet);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Cidr {
    network: Ipv4Addr,
    prefix: u8,
}

impl Cidr {
    /// The whole IPv4 space
    pub const ANY: Self = Self {
        network: Ipv4Addr::UNSPECIFIED,
        prefix: 0,
    };

    /// Create a block from a network address and prefix length
    pub fn new(network: Ipv4Addr, prefix: u8) -> Result<Self> {
        if prefix > 32 {
            return Err(Error::InvalidPrefixLength(prefix));
        }
        let cidr = Self { network, prefix };
        if u32::from(network) & !cidr.mask() != 0 {
            return Err(Error::InvalidCidr(format!("{network}/{prefix} has host bits set")));
        }
        Ok(cidr)
    }

    /// Network address
    pub fn network(&self) -> Ipv4Addr {
        self.network
    }

    /// Prefix length
    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    fn mask(&self) -> u32 {
        u32::MAX.checked_shl(32 - u32::from(self.prefix)).unwrap_or(0)
    }

    fn first(&self) -> u32 {
        u32::from(self.network)
    }

    fn last(&self) -> u32 {
        self.first() | !self.mask()
    }

    /// Number of addresses in the block
    pub fn size(&self) -> u64 {
        1u64 << (32 - u32::from(self.prefix))
    }

    /// Whether an address is inside the block
    pub fn contains_addr(&self, addr: Ipv4Addr) -> bool {
        u32::from(addr) & self.mask() == self.first()
    }

    /// Whether `other` is inside this block (or equal to it)
    pub fn contains(&self, other: &Self) -> bool {
        other.prefix >= self.prefix && self.contains_addr(other.network)
    }

    /// Whether `other` is inside this block and smaller than it
    pub fn strictly_contains(&self, other: &Self) -> bool {
        other.prefix > self.prefix && self.contains(other)
    }

    /// Whether the two blocks share any address
    pub fn overlaps(&self, other: &Self) -> bool {
        self.first() <= other.last() && other.first() <= self.last()
    }

    /// The `index`-th block of length `new_prefix` inside this one
    pub fn subnet(&self, new_prefix: u8, index: u32) -> Result<Self> {
        if new_prefix > 32 || new_prefix < self.prefix {
            return Err(Error::InvalidPrefixLength(new_prefix));
        }
        let count = 1u64 << (new_prefix - self.prefix);
        if u64::from(index) >= count {
            return Err(Error::InvalidCidr(format!(
                "{self} has only {count} /{new_prefix} blocks, asked for #{index}"
            )));
        }
        let step = 1u64 << (32 - u32::from(new_prefix));
        let start = u64::from(self.first()) + u64::from(index) * step;
        let network = u32::try_from(start).map_err(|_| Error::InvalidCidr(self.to_string()))?;
        Self::new(Ipv4Addr::from(network), new_prefix)
    }
}

impl fmt::Display for Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix)
    }
}

impl FromStr for Cidr {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (addr, prefix) = s
            .trim()
            .split_once('/')
            .ok_or_else(|| Error::InvalidCidr(s.to_string()))?;
        let network = Ipv4Addr::from_str(addr).map_err(|_| Error::InvalidCidr(s.to_string()))?;
        let prefix = prefix
            .parse::<u8>()
            .map_err(|_| Error::InvalidCidr(s.to_string()))?;
        Self::new(network, prefix)
    }
}

impl TryFrom<String> for Cidr {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<Cidr> for String {
    fn from(cidr: Cidr) -> Self {
        cidr.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cidr(s: &str) -> Cidr {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_and_display() {
        let c = cidr("10.0.1.0/24");
        assert_eq!(c.network(), Ipv4Addr::new(10, 0, 1, 0));
        assert_eq!(c.prefix(), 24);
        assert_eq!(c.to_string(), "10.0.1.0/24");
        assert_eq!(c.size(), 256);
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!("10.0.1.0".parse::<Cidr>(), Err(Error::InvalidCidr(_))));
        assert!(matches!("10.0.1/24".parse::<Cidr>(), Err(Error::InvalidCidr(_))));
        assert!(matches!("10.0.1.0/33".parse::<Cidr>(), Err(Error::InvalidPrefixLength(33))));
        assert!(matches!("10.0.1.7/24".parse::<Cidr>(), Err(Error::InvalidCidr(_))));
    }

    #[test]
    fn test_containment() {
        let vpc = cidr("10.0.0.0/16");
        assert!(vpc.contains(&cidr("10.0.5.0/24")));
        assert!(vpc.strictly_contains(&cidr("10.0.5.0/24")));
        assert!(vpc.contains(&vpc));
        assert!(!vpc.strictly_contains(&vpc));
        assert!(!vpc.contains(&cidr("10.1.0.0/24")));
        assert!(Cidr::ANY.contains(&vpc));
    }

    #[test]
    fn test_overlap() {
        assert!(cidr("10.0.0.0/23").overlaps(&cidr("10.0.1.0/24")));
        assert!(!cidr("10.0.1.0/24").overlaps(&cidr("10.0.2.0/24")));
    }

    #[test]
    fn test_subnet_carving() {
        let vpc = cidr("10.0.0.0/16");
        assert_eq!(vpc.subnet(24, 0).unwrap(), cidr("10.0.0.0/24"));
        assert_eq!(vpc.subnet(24, 6).unwrap(), cidr("10.0.6.0/24"));
        assert!(vpc.subnet(24, 256).is_err());
        assert!(vpc.subnet(8, 0).is_err());
    }
}
