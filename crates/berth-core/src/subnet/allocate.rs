//! Replacement subnet allocation.
//!
//! Candidates come from the configured bands in priority order (by default
//! `10.x.0.0/24`, then `192.168.x.0/24`, then the part of `172.16.0.0/12`
//! outside the runtime's default bridge pool). The first candidate that
//! overlaps nothing in the ledger wins and is claimed immediately.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::ledger::SubnetLedger;
use super::remap::remap_service_ips;
use crate::config::SubnetPolicy;
use crate::error::AllocationWarning;
use crate::types::{NetworkConflict, NetworkConflictKind, NetworkResolution};

/// Result of a subnet allocation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubnetOutcome {
    /// Applied resolutions.
    pub resolutions: Vec<NetworkResolution>,
    /// Exhausted pools and addresses that could not be remapped.
    pub warnings: Vec<AllocationWarning>,
}

/// Allocate a replacement subnet for every `subnet` conflict and remap its
/// static addresses.
///
/// Name conflicts are reported by detection only and are not resolved here.
pub fn allocate_subnets(
    conflicts: &[NetworkConflict],
    ledger: &mut SubnetLedger,
    policy: &SubnetPolicy,
) -> SubnetOutcome {
    let mut outcome = SubnetOutcome::default();

    for conflict in conflicts {
        if conflict.kind != NetworkConflictKind::Subnet {
            continue;
        }
        let Some(original) = conflict.original_subnet else {
            continue;
        };

        let Some(subnet) = policy.candidates().find(|c| ledger.is_free(c)) else {
            warn!(network = %conflict.network_name, "no available subnet in any band");
            outcome.warnings.push(AllocationWarning::SubnetPoolExhausted {
                network: conflict.network_name.clone(),
            });
            continue;
        };
        ledger.claim(subnet);
        debug!(network = %conflict.network_name, from = %original, to = %subnet, "subnet reassigned");

        let (mapping, warnings) = remap_service_ips(&conflict.service_ips, &original, &subnet);
        outcome.warnings.extend(warnings);
        outcome.resolutions.push(NetworkResolution {
            network_name: conflict.network_name.clone(),
            original_subnet: original,
            resolved_subnet: subnet,
            ip_address_mapping: mapping,
            reason: format!("subnet {original} is in use; moved to {subnet}"),
        });
    }

    info!(
        resolved = outcome.resolutions.len(),
        warnings = outcome.warnings.len(),
        "subnet allocation complete"
    );
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::net::Ipv4Addr;

    use ipnet::Ipv4Net;
    use proptest::prelude::*;

    use crate::config::SubnetBand;

    fn net(cidr: &str) -> Ipv4Net {
        cidr.parse().expect("valid cidr")
    }

    fn subnet_conflict(name: &str, cidr: &str, ips: &[(&str, Ipv4Addr)]) -> NetworkConflict {
        NetworkConflict {
            network_name: name.into(),
            actual_name: format!("p_{name}"),
            kind: NetworkConflictKind::Subnet,
            original_subnet: Some(net(cidr)),
            description: String::new(),
            service_ips: ips.iter().map(|(s, ip)| ((*s).to_string(), *ip)).collect(),
        }
    }

    #[test]
    fn test_first_band_first_slot() {
        let mut ledger = SubnetLedger::new();
        ledger.claim(net("172.20.0.0/24"));
        let conflicts = vec![subnet_conflict(
            "app-network",
            "172.20.0.0/24",
            &[("db", Ipv4Addr::new(172, 20, 0, 5))],
        )];
        let outcome = allocate_subnets(&conflicts, &mut ledger, &SubnetPolicy::default());
        assert_eq!(outcome.resolutions.len(), 1);
        let resolution = &outcome.resolutions[0];
        assert_eq!(resolution.resolved_subnet, net("10.20.0.0/24"));
        assert_eq!(resolution.ip_address_mapping["db"], Ipv4Addr::new(10, 20, 0, 5));
        assert!(outcome.warnings.is_empty());
    }

    #[test]
    fn test_sequential_allocations_disjoint() {
        let mut ledger = SubnetLedger::new();
        ledger.claim(net("10.21.0.0/24"));
        let conflicts = vec![
            subnet_conflict("a", "172.20.0.0/24", &[]),
            subnet_conflict("b", "172.21.0.0/24", &[]),
        ];
        let outcome = allocate_subnets(&conflicts, &mut ledger, &SubnetPolicy::default());
        let subnets: Vec<Ipv4Net> = outcome.resolutions.iter().map(|r| r.resolved_subnet).collect();
        assert_eq!(subnets, vec![net("10.20.0.0/24"), net("10.22.0.0/24")]);
    }

    #[test]
    fn test_wide_existing_network_skips_band() {
        let mut ledger = SubnetLedger::new();
        ledger.claim(net("10.0.0.0/8"));
        let outcome = allocate_subnets(
            &[subnet_conflict("a", "172.20.0.0/24", &[])],
            &mut ledger,
            &SubnetPolicy::default(),
        );
        assert_eq!(outcome.resolutions[0].resolved_subnet, net("192.168.100.0/24"));
    }

    #[test]
    fn test_pool_exhausted_is_warning() {
        let policy = SubnetPolicy {
            bands: vec![SubnetBand {
                base: Ipv4Addr::new(10, 0, 0, 0),
                octet: 1,
                first: 20,
                last: 20,
                exclude: vec![],
                prefix_len: 24,
            }],
        };
        let mut ledger = SubnetLedger::new();
        let conflicts = vec![
            subnet_conflict("a", "172.20.0.0/24", &[]),
            subnet_conflict("b", "172.21.0.0/24", &[]),
        ];
        let outcome = allocate_subnets(&conflicts, &mut ledger, &policy);
        assert_eq!(outcome.resolutions.len(), 1);
        assert_eq!(
            outcome.warnings,
            vec![AllocationWarning::SubnetPoolExhausted { network: "b".into() }]
        );
    }

    #[test]
    fn test_name_conflicts_ignored() {
        let conflict = NetworkConflict {
            kind: NetworkConflictKind::Name,
            ..subnet_conflict("a", "172.20.0.0/24", &[])
        };
        let outcome = allocate_subnets(&[conflict], &mut SubnetLedger::new(), &SubnetPolicy::default());
        assert!(outcome.resolutions.is_empty());
        assert!(outcome.warnings.is_empty());
    }

    mod proptest_tests {
        use super::*;

        proptest! {
            #[test]
            fn allocations_avoid_used_and_each_other(
                used_octets in proptest::collection::btree_set(20u8..=60, 0..30),
                count in 1usize..12,
            ) {
                let mut ledger = SubnetLedger::new();
                let used: Vec<Ipv4Net> = used_octets
                    .iter()
                    .map(|o| net(&format!("10.{o}.0.0/24")))
                    .collect();
                for subnet in &used {
                    ledger.claim(*subnet);
                }
                let conflicts: Vec<NetworkConflict> = (0..count)
                    .map(|i| subnet_conflict(&format!("n{i}"), "172.20.0.0/24", &[]))
                    .collect();

                let outcome = allocate_subnets(&conflicts, &mut ledger, &SubnetPolicy::default());
                prop_assert_eq!(outcome.resolutions.len(), count);

                let mut seen = BTreeSet::new();
                let mut previous = 0u32;
                for r in &outcome.resolutions {
                    prop_assert!(seen.insert(r.resolved_subnet));
                    prop_assert!(!used.contains(&r.resolved_subnet));
                    // Priority order within the first band is ascending.
                    let value = u32::from(r.resolved_subnet.network());
                    prop_assert!(value > previous);
                    previous = value;
                    prop_assert!(r.ip_address_mapping.is_empty());
                }
            }
        }
    }
}
