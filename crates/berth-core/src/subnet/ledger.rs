//! Run-scoped subnet and network-name exclusion set.

use std::collections::BTreeSet;

use ipnet::Ipv4Net;
use tracing::{debug, warn};

use crate::probe::NetworkInfo;

/// Subnets and runtime network names already taken.
///
/// Subnets are compared by overlap, not by string: `10.1.0.0/16` blocks
/// `10.1.5.0/24`.
#[derive(Debug, Clone, Default)]
pub struct SubnetLedger {
    subnets: Vec<Ipv4Net>,
    names: BTreeSet<String>,
}

/// Returns true if two networks share at least one address.
#[must_use]
pub fn overlaps(a: &Ipv4Net, b: &Ipv4Net) -> bool {
    a.contains(&b.network()) || b.contains(&a.network())
}

impl SubnetLedger {
    /// Create an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a ledger from probed networks.
    ///
    /// IPv6 subnets are ignored; unparseable entries are logged and skipped.
    #[must_use]
    pub fn from_networks(networks: &[NetworkInfo]) -> Self {
        let mut ledger = Self::new();
        for network in networks {
            ledger.claim_name(&network.name);
            for subnet in &network.subnets {
                match subnet.parse::<Ipv4Net>() {
                    Ok(net) => {
                        ledger.claim(net.trunc());
                    }
                    Err(_) if subnet.contains(':') => {
                        debug!(network = %network.name, %subnet, "ignoring IPv6 subnet");
                    }
                    Err(e) => {
                        warn!(network = %network.name, %subnet, error = %e, "ignoring unparseable subnet");
                    }
                }
            }
        }
        ledger
    }

    /// First taken subnet overlapping `subnet`, if any.
    #[must_use]
    pub fn overlapping(&self, subnet: &Ipv4Net) -> Option<Ipv4Net> {
        self.subnets.iter().find(|used| overlaps(used, subnet)).copied()
    }

    /// Returns true if `subnet` is free.
    #[must_use]
    pub fn is_free(&self, subnet: &Ipv4Net) -> bool {
        self.overlapping(subnet).is_none()
    }

    /// Record `subnet` as taken. Returns false if it was already recorded.
    pub fn claim(&mut self, subnet: Ipv4Net) -> bool {
        if self.subnets.contains(&subnet) {
            return false;
        }
        self.subnets.push(subnet);
        true
    }

    /// Returns true if a network with this runtime name exists.
    #[must_use]
    pub fn has_name(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Record a runtime network name as taken.
    pub fn claim_name(&mut self, name: &str) {
        self.names.insert(name.to_string());
    }

    /// Subnets taken so far.
    #[must_use]
    pub fn subnets(&self) -> &[Ipv4Net] {
        &self.subnets
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn net(cidr: &str) -> Ipv4Net {
        cidr.parse().expect("valid cidr")
    }

    #[test]
    fn test_overlap() {
        assert!(overlaps(&net("10.1.0.0/16"), &net("10.1.5.0/24")));
        assert!(overlaps(&net("10.1.5.0/24"), &net("10.1.0.0/16")));
        assert!(overlaps(&net("10.1.5.0/24"), &net("10.1.5.0/24")));
        assert!(!overlaps(&net("10.1.5.0/24"), &net("10.1.6.0/24")));
    }

    #[test]
    fn test_from_networks() {
        let ledger = SubnetLedger::from_networks(&[
            NetworkInfo::new("bridge", &["172.17.0.0/16", "fd00::/64"]),
            NetworkInfo::new("weird", &["not-a-cidr"]),
            NetworkInfo::new("host", &[]),
        ]);
        assert_eq!(ledger.subnets(), &[net("172.17.0.0/16")]);
        assert!(ledger.has_name("bridge"));
        assert!(ledger.has_name("host"));
        assert!(!ledger.is_free(&net("172.17.3.0/24")));
        assert!(ledger.is_free(&net("172.18.0.0/24")));
    }

    #[test]
    fn test_claim_grows() {
        let mut ledger = SubnetLedger::new();
        assert!(ledger.claim(net("10.20.0.0/24")));
        assert!(!ledger.claim(net("10.20.0.0/24")));
        assert_eq!(ledger.overlapping(&net("10.20.0.128/25")), Some(net("10.20.0.0/24")));
    }
}
