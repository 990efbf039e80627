//! Layered security topology
//!
//! Allow-rules are edges between groups, one group per [`Tier`]. Rules name
//! groups rather than addresses, so the layering check is static: it does
//! not depend on which addresses the groups hold at runtime.
//!
//! Layering rules enforced by [`SecurityTopology::validate`]:
//! - group edges go exactly one tier deeper (public -> app -> db)
//! - admin reaches app on TCP 22 and nothing else
//! - no self-loops or cycles
//! - addresses outside the VPC may only reach public and admin

use crate::cidr::Cidr;
use crate::error::{Error, Result};
use crate::tier::Tier;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// SSH port on the admin to app edge
pub const SSH_PORT: u16 = 22;

/// Transport protocol of a rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
    Icmp,
    /// Every protocol
    All,
}

impl Protocol {
    /// Provider spelling (`-1` for all protocols)
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Udp => "udp",
            Self::Icmp => "icmp",
            Self::All => "-1",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("all"),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Inclusive port range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortRange {
    from: u16,
    to: u16,
}

impl PortRange {
    /// Range from `from` to `to`, inclusive
    pub fn new(from: u16, to: u16) -> Result<Self> {
        if from > to {
            return Err(Error::InvalidPortRange { from, to });
        }
        Ok(Self { from, to })
    }

    /// A single port
    pub fn single(port: u16) -> Self {
        Self { from: port, to: port }
    }

    /// Every port
    pub fn all() -> Self {
        Self { from: 0, to: u16::MAX }
    }

    pub fn from(&self) -> u16 {
        self.from
    }

    pub fn to(&self) -> u16 {
        self.to
    }

    /// Whether the range is exactly one port
    pub fn is_single(&self, port: u16) -> bool {
        self.from == port && self.to == port
    }
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.from == self.to {
            write!(f, "{}", self.from)
        } else {
            write!(f, "{}-{}", self.from, self.to)
        }
    }
}

/// Where allowed traffic comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    /// Members of another group
    Group(Tier),
    /// An address block outside the topology
    Cidr(Cidr),
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Group(tier) => write!(f, "{tier}"),
            Self::Cidr(cidr) => write!(f, "{cidr}"),
        }
    }
}

/// A directed, protocol and port scoped allow-rule
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SecurityEdge {
    pub source: Source,
    pub destination: Tier,
    pub protocol: Protocol,
    pub ports: PortRange,
}

impl SecurityEdge {
    /// Check this edge against the layering rules, ignoring other edges
    fn check(&self) -> Result<()> {
        let dst = self.destination;
        let src = match self.source {
            Source::Cidr(_) if dst.accepts_external() => return Ok(()),
            Source::Cidr(_) => {
                return Err(Error::violation(
                    self,
                    format!("{dst} tier must not accept traffic from outside the VPC"),
                ));
            }
            Source::Group(src) => src,
        };

        if src == dst {
            return Err(Error::violation(self, "a group must not allow itself"));
        }
        if src == Tier::Admin {
            let ssh = dst == Tier::App && self.protocol == Protocol::Tcp && self.ports.is_single(SSH_PORT);
            if ssh {
                return Ok(());
            }
            return Err(Error::violation(
                self,
                format!("admin may only reach app on tcp/{SSH_PORT}"),
            ));
        }
        if dst == Tier::Admin {
            return Err(Error::violation(self, "admin only accepts external SSH"));
        }
        if dst.rank() <= src.rank() {
            return Err(Error::violation(
                self,
                format!("{dst} must not accept traffic from the more private {src} tier"),
            ));
        }
        if dst.rank() != src.rank() + 1 {
            return Err(Error::violation(
                self,
                format!("{src} must not skip a tier to reach {dst}"),
            ));
        }
        Ok(())
    }
}

impl fmt::Display for SecurityEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {} {}/{}",
            self.source, self.destination, self.protocol, self.ports
        )
    }
}

/// Outbound policy for a group
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EgressPolicy {
    /// All outbound traffic permitted
    #[default]
    AllowAll,
    /// No outbound rule at all
    DenyAll,
}

/// The full set of allow-rules across the four groups
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityTopology {
    edges: Vec<SecurityEdge>,
    egress: BTreeMap<Tier, EgressPolicy>,
}

impl SecurityTopology {
    /// Empty topology: no ingress, all egress allowed
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard three-tier policy.
    ///
    /// Internet to public on 80/443, admin CIDRs to admin on 22, public to app
    /// on `app_port`, admin to app on 22 and app to db on `db_port`. The db
    /// group gets no egress.
    pub fn three_tier(app_port: u16, db_port: u16, admin_cidrs: &[Cidr]) -> Self {
        let mut topology = Self::new();
        for port in [80, 443] {
            topology.add_ingress(Cidr::ANY, Tier::Public, Protocol::Tcp, PortRange::single(port));
        }
        for cidr in admin_cidrs {
            topology.add_ingress(*cidr, Tier::Admin, Protocol::Tcp, PortRange::single(SSH_PORT));
        }
        topology
            .add_edge(Tier::Public, Tier::App, Protocol::Tcp, PortRange::single(app_port))
            .add_edge(Tier::Admin, Tier::App, Protocol::Tcp, PortRange::single(SSH_PORT))
            .add_edge(Tier::App, Tier::Db, Protocol::Tcp, PortRange::single(db_port))
            .set_egress(Tier::Db, EgressPolicy::DenyAll);
        topology
    }

    /// Allow traffic from one group to another. Checked by [`Self::validate`].
    pub fn add_edge(&mut self, source: Tier, destination: Tier, protocol: Protocol, ports: PortRange) -> &mut Self {
        self.edges.push(SecurityEdge {
            source: Source::Group(source),
            destination,
            protocol,
            ports,
        });
        self
    }

    /// Allow traffic from an address block into a group
    pub fn add_ingress(&mut self, cidr: Cidr, destination: Tier, protocol: Protocol, ports: PortRange) -> &mut Self {
        self.edges.push(SecurityEdge {
            source: Source::Cidr(cidr),
            destination,
            protocol,
            ports,
        });
        self
    }

    /// Set a group's outbound policy
    pub fn set_egress(&mut self, tier: Tier, policy: EgressPolicy) -> &mut Self {
        self.egress.insert(tier, policy);
        self
    }

    /// Outbound policy of a group (allow-all unless set)
    pub fn egress(&self, tier: Tier) -> EgressPolicy {
        self.egress.get(&tier).copied().unwrap_or_default()
    }

    /// Every rule, in insertion order
    pub fn edges(&self) -> &[SecurityEdge] {
        &self.edges
    }

    /// Effective allow-list of a group: every rule terminating there
    pub fn resolve(&self, tier: Tier) -> Vec<&SecurityEdge> {
        self.edges.iter().filter(|e| e.destination == tier).collect()
    }

    /// Check every rule against the layering invariant
    pub fn validate(&self) -> Result<()> {
        for edge in &self.edges {
            edge.check()?;
        }
        self.check_acyclic()?;
        log::debug!("security topology valid ({} rules)", self.edges.len());
        Ok(())
    }

    fn check_acyclic(&self) -> Result<()> {
        let group_edges: Vec<(Tier, Tier, &SecurityEdge)> = self
            .edges
            .iter()
            .filter_map(|e| match e.source {
                Source::Group(src) => Some((src, e.destination, e)),
                Source::Cidr(_) => None,
            })
            .collect();

        let mut remaining: BTreeSet<Tier> = Tier::ALL.into_iter().collect();
        loop {
            let sources: Vec<Tier> = remaining
                .iter()
                .copied()
                .filter(|t| {
                    !group_edges
                        .iter()
                        .any(|(src, dst, _)| dst == t && remaining.contains(src))
                })
                .collect();
            if sources.is_empty() {
                break;
            }
            for tier in sources {
                remaining.remove(&tier);
            }
        }

        match group_edges
            .iter()
            .find(|(src, dst, _)| remaining.contains(src) && remaining.contains(dst))
        {
            Some((_, _, edge)) => Err(Error::violation(edge, "edge is part of a cycle")),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn admin_cidrs() -> Vec<Cidr> {
        vec!["203.0.113.0/24".parse().unwrap()]
    }

    fn violation_reason(topology: &SecurityTopology) -> String {
        match topology.validate().unwrap_err() {
            Error::SecurityLayeringViolation { reason, .. } => reason,
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_three_tier_is_valid() {
        let topology = SecurityTopology::three_tier(8080, 5432, &admin_cidrs());
        topology.validate().unwrap();
        assert_eq!(topology.edges().len(), 6);
        assert_eq!(topology.egress(Tier::Db), EgressPolicy::DenyAll);
        assert_eq!(topology.egress(Tier::App), EgressPolicy::AllowAll);
    }

    #[test]
    fn test_reversed_db_to_app_rejected() {
        let mut topology = SecurityTopology::three_tier(8080, 5432, &admin_cidrs());
        topology.add_edge(Tier::Db, Tier::App, Protocol::Tcp, PortRange::single(8080));

        match topology.validate().unwrap_err() {
            Error::SecurityLayeringViolation { edge, reason } => {
                assert_eq!(edge, "db -> app tcp/8080");
                assert!(reason.contains("more private"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_public_to_db_rejected() {
        let mut topology = SecurityTopology::new();
        topology.add_edge(Tier::Public, Tier::Db, Protocol::Tcp, PortRange::single(5432));
        assert!(violation_reason(&topology).contains("skip"));
    }

    #[test]
    fn test_internet_to_db_rejected() {
        let mut topology = SecurityTopology::new();
        topology.add_ingress(Cidr::ANY, Tier::Db, Protocol::Tcp, PortRange::single(5432));
        assert!(violation_reason(&topology).contains("outside the VPC"));
    }

    #[test]
    fn test_admin_limited_to_ssh_on_app() {
        let mut topology = SecurityTopology::new();
        topology.add_edge(Tier::Admin, Tier::App, Protocol::Tcp, PortRange::single(8080));
        assert!(violation_reason(&topology).contains("tcp/22"));

        let mut topology = SecurityTopology::new();
        topology.add_edge(Tier::Admin, Tier::Db, Protocol::Tcp, PortRange::single(SSH_PORT));
        assert!(topology.validate().is_err());
    }

    #[test]
    fn test_self_loop_rejected() {
        let mut topology = SecurityTopology::new();
        topology.add_edge(Tier::App, Tier::App, Protocol::All, PortRange::all());
        assert!(violation_reason(&topology).contains("itself"));
    }

    #[test]
    fn test_resolve_returns_inbound_rules() {
        let topology = SecurityTopology::three_tier(8080, 5432, &admin_cidrs());
        let app = topology.resolve(Tier::App);
        assert_eq!(app.len(), 2);
        assert!(app.iter().all(|e| e.destination == Tier::App));
        assert!(app.iter().any(|e| e.source == Source::Group(Tier::Admin)));

        let db = topology.resolve(Tier::Db);
        assert_eq!(db.len(), 1);
        assert_eq!(db[0].source, Source::Group(Tier::App));
        assert_eq!(db[0].ports, PortRange::single(5432));
    }

    #[test]
    fn test_port_range() {
        assert!(PortRange::new(10, 1).is_err());
        assert_eq!(PortRange::new(1000, 2000).unwrap().to_string(), "1000-2000");
        assert_eq!(PortRange::single(22).to_string(), "22");
    }
}
