//! Subnet allocation across tiers and availability zones

use crate::cidr::Cidr;
use crate::error::{Error, Result};
use crate::tier::Tier;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Minimum subnets per tier
pub const MIN_SUBNETS_PER_TIER: usize = 2;
/// Minimum distinct availability zones per tier
pub const MIN_ZONES_PER_TIER: usize = 2;

/// One subnet: a block in a tier, pinned to an availability zone
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubnetAllocation {
    pub cidr: Cidr,
    pub tier: Tier,
    pub zone: String,
}

/// Validated subnet layout of a VPC
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubnetPlan {
    vpc: Cidr,
    allocations: Vec<SubnetAllocation>,
}

impl SubnetPlan {
    /// Assign zones round-robin to each tier's blocks, then validate.
    ///
    /// The n-th block of a tier lands in zone `n % zones.len()`.
    pub fn allocate(vpc: Cidr, zones: &[String], public: &[Cidr], app: &[Cidr], db: &[Cidr]) -> Result<Self> {
        if zones.is_empty() {
            return Err(Error::EmptyZones);
        }

        let allocations = [(Tier::Public, public), (Tier::App, app), (Tier::Db, db)]
            .into_iter()
            .flat_map(|(tier, blocks)| {
                blocks.iter().enumerate().map(move |(i, cidr)| SubnetAllocation {
                    cidr: *cidr,
                    tier,
                    zone: zones[i % zones.len()].clone(),
                })
            })
            .collect();

        let plan = Self { vpc, allocations };
        plan.validate()?;
        Ok(plan)
    }

    /// Carve `per_tier` consecutive blocks of `/prefix` per tier out of the VPC.
    ///
    /// Block 0 is left unused; public takes the next `per_tier` blocks, then
    /// app, then db. A /16 with `per_tier = 2` and `prefix = 24` yields
    /// 10.0.1.0/24 through 10.0.6.0/24.
    pub fn carve(vpc: Cidr, zones: &[String], per_tier: u32, prefix: u8) -> Result<Self> {
        let block = |n: u32| vpc.subnet(prefix, n);
        let tier_blocks = |offset: u32| -> Result<Vec<Cidr>> {
            (0..per_tier).map(|i| block(1 + offset * per_tier + i)).collect()
        };
        Self::allocate(vpc, zones, &tier_blocks(0)?, &tier_blocks(1)?, &tier_blocks(2)?)
    }

    /// VPC block
    pub fn vpc(&self) -> Cidr {
        self.vpc
    }

    /// Every allocation
    pub fn allocations(&self) -> &[SubnetAllocation] {
        &self.allocations
    }

    /// Allocations of one tier, in order
    pub fn tier(&self, tier: Tier) -> impl Iterator<Item = &SubnetAllocation> {
        self.allocations.iter().filter(move |a| a.tier == tier)
    }

    /// Distinct zones used by a tier
    pub fn zones(&self, tier: Tier) -> BTreeSet<&str> {
        self.tier(tier).map(|a| a.zone.as_str()).collect()
    }

    /// Check containment, disjointness and per-tier quorum
    pub fn validate(&self) -> Result<()> {
        for (i, a) in self.allocations.iter().enumerate() {
            if !self.vpc.strictly_contains(&a.cidr) {
                return Err(Error::OutsideVpc {
                    cidr: a.cidr.to_string(),
                    vpc: self.vpc.to_string(),
                });
            }
            if let Some(b) = self.allocations[i + 1..].iter().find(|b| a.cidr.overlaps(&b.cidr)) {
                return Err(Error::OverlappingCidr {
                    first: format!("{} ({})", a.cidr, a.tier),
                    second: format!("{} ({})", b.cidr, b.tier),
                });
            }
        }

        for tier in Tier::SUBNET_TIERS {
            let count = self.tier(tier).count();
            if count < MIN_SUBNETS_PER_TIER {
                return Err(Error::InsufficientSubnets {
                    tier,
                    count,
                    required: MIN_SUBNETS_PER_TIER,
                });
            }
            let zones = self.zones(tier).len();
            if zones < MIN_ZONES_PER_TIER {
                return Err(Error::InsufficientZones {
                    tier,
                    count: zones,
                    required: MIN_ZONES_PER_TIER,
                });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cidrs(list: &[&str]) -> Vec<Cidr> {
        list.iter().map(|s| s.parse().unwrap()).collect()
    }

    fn zones() -> Vec<String> {
        vec!["eu-west-1a".to_string(), "eu-west-1b".to_string()]
    }

    fn vpc() -> Cidr {
        "10.0.0.0/16".parse().unwrap()
    }

    #[test]
    fn test_allocate_three_tiers() {
        let plan = SubnetPlan::allocate(
            vpc(),
            &zones(),
            &cidrs(&["10.0.1.0/24", "10.0.2.0/24"]),
            &cidrs(&["10.0.3.0/24", "10.0.4.0/24"]),
            &cidrs(&["10.0.5.0/24", "10.0.6.0/24"]),
        )
        .unwrap();

        assert_eq!(plan.allocations().len(), 6);
        for tier in Tier::SUBNET_TIERS {
            assert_eq!(plan.zones(tier).len(), 2);
        }
        let app: Vec<_> = plan.tier(Tier::App).collect();
        assert_eq!(app[0].zone, "eu-west-1a");
        assert_eq!(app[1].zone, "eu-west-1b");
        assert_eq!(plan.tier(Tier::Admin).count(), 0);
    }

    #[test]
    fn test_overlap_across_tiers_rejected() {
        let err = SubnetPlan::allocate(
            vpc(),
            &zones(),
            &cidrs(&["10.0.1.0/24", "10.0.2.0/24"]),
            &cidrs(&["10.0.2.0/25", "10.0.4.0/24"]),
            &cidrs(&["10.0.5.0/24", "10.0.6.0/24"]),
        )
        .unwrap_err();
        assert!(matches!(err, Error::OverlappingCidr { .. }));
    }

    #[test]
    fn test_subnet_outside_vpc_rejected() {
        let err = SubnetPlan::allocate(
            vpc(),
            &zones(),
            &cidrs(&["10.0.1.0/24", "10.1.2.0/24"]),
            &cidrs(&["10.0.3.0/24", "10.0.4.0/24"]),
            &cidrs(&["10.0.5.0/24", "10.0.6.0/24"]),
        )
        .unwrap_err();
        assert!(matches!(err, Error::OutsideVpc { .. }));
    }

    #[test]
    fn test_subnet_equal_to_vpc_rejected() {
        let err = SubnetPlan::allocate(
            vpc(),
            &zones(),
            &cidrs(&["10.0.0.0/16", "10.0.2.0/24"]),
            &cidrs(&["10.0.3.0/24", "10.0.4.0/24"]),
            &cidrs(&["10.0.5.0/24", "10.0.6.0/24"]),
        )
        .unwrap_err();
        assert!(matches!(err, Error::OutsideVpc { .. }));
    }

    #[test]
    fn test_quorum() {
        let err = SubnetPlan::allocate(
            vpc(),
            &zones(),
            &cidrs(&["10.0.1.0/24", "10.0.2.0/24"]),
            &cidrs(&["10.0.3.0/24"]),
            &cidrs(&["10.0.5.0/24", "10.0.6.0/24"]),
        )
        .unwrap_err();
        assert!(matches!(err, Error::InsufficientSubnets { tier: Tier::App, count: 1, .. }));

        let err = SubnetPlan::allocate(
            vpc(),
            &zones()[..1],
            &cidrs(&["10.0.1.0/24", "10.0.2.0/24"]),
            &cidrs(&["10.0.3.0/24", "10.0.4.0/24"]),
            &cidrs(&["10.0.5.0/24", "10.0.6.0/24"]),
        )
        .unwrap_err();
        assert!(matches!(err, Error::InsufficientZones { tier: Tier::Public, .. }));

        assert_eq!(
            SubnetPlan::allocate(vpc(), &[], &[], &[], &[]).unwrap_err(),
            Error::EmptyZones
        );
    }

    #[test]
    fn test_carve_matches_manual_layout() {
        let carved = SubnetPlan::carve(vpc(), &zones(), 2, 24).unwrap();
        let manual = SubnetPlan::allocate(
            vpc(),
            &zones(),
            &cidrs(&["10.0.1.0/24", "10.0.2.0/24"]),
            &cidrs(&["10.0.3.0/24", "10.0.4.0/24"]),
            &cidrs(&["10.0.5.0/24", "10.0.6.0/24"]),
        )
        .unwrap();
        assert_eq!(carved, manual);
    }
}
