//! Static IP remapping onto a replacement subnet.
//!
//! An address keeps its offset from the network address:
//! `new.network() + (ip - old.network())`. For equal prefix lengths this is
//! a bijection between the two subnets, so a `/24` to `/24` move preserves
//! the last octet.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use ipnet::Ipv4Net;
use tracing::{debug, warn};

use crate::error::AllocationWarning;

/// Why an address could not be remapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemapFailure {
    /// The address is not inside the old subnet.
    OutsideOldSubnet,
    /// The shifted address does not fit in the new subnet.
    OutsideNewSubnet,
}

/// Move a single address from `old` to `new`.
///
/// # Errors
///
/// Returns a [`RemapFailure`] if the address is not in `old` or its offset
/// does not fit in `new`.
pub fn remap_ip(ip: Ipv4Addr, old: &Ipv4Net, new: &Ipv4Net) -> Result<Ipv4Addr, RemapFailure> {
    if !old.contains(&ip) {
        return Err(RemapFailure::OutsideOldSubnet);
    }
    let offset = u32::from(ip) - u32::from(old.network());
    let candidate = u32::from(new.network())
        .checked_add(offset)
        .map(Ipv4Addr::from)
        .ok_or(RemapFailure::OutsideNewSubnet)?;
    if new.contains(&candidate) {
        Ok(candidate)
    } else {
        Err(RemapFailure::OutsideNewSubnet)
    }
}

/// Remap every service address; failures are skipped and reported.
#[must_use]
pub fn remap_service_ips(
    ips: &BTreeMap<String, Ipv4Addr>,
    old: &Ipv4Net,
    new: &Ipv4Net,
) -> (BTreeMap<String, Ipv4Addr>, Vec<AllocationWarning>) {
    let mut mapping = BTreeMap::new();
    let mut warnings = Vec::new();

    for (service, ip) in ips {
        match remap_ip(*ip, old, new) {
            Ok(new_ip) => {
                debug!(%service, from = %ip, to = %new_ip, "static address remapped");
                mapping.insert(service.clone(), new_ip);
            }
            Err(RemapFailure::OutsideOldSubnet) => {
                warn!(%service, %ip, subnet = %old, "static address is outside its subnet; not remapped");
                warnings.push(AllocationWarning::IpOutsideSubnet {
                    service: service.clone(),
                    ip: *ip,
                    subnet: *old,
                });
            }
            Err(RemapFailure::OutsideNewSubnet) => {
                warn!(%service, %ip, subnet = %new, "static address does not fit the new subnet; not remapped");
                warnings.push(AllocationWarning::RemapOutOfRange {
                    service: service.clone(),
                    ip: *ip,
                    subnet: *new,
                });
            }
        }
    }

    (mapping, warnings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn net(cidr: &str) -> Ipv4Net {
        cidr.parse().expect("valid cidr")
    }

    #[test]
    fn test_last_octet_preserved() {
        let ip = remap_ip(Ipv4Addr::new(172, 20, 0, 5), &net("172.20.0.0/24"), &net("10.20.0.0/24"));
        assert_eq!(ip, Ok(Ipv4Addr::new(10, 20, 0, 5)));
    }

    #[test]
    fn test_outside_old_subnet() {
        let ip = remap_ip(Ipv4Addr::new(172, 21, 0, 5), &net("172.20.0.0/24"), &net("10.20.0.0/24"));
        assert_eq!(ip, Err(RemapFailure::OutsideOldSubnet));
    }

    #[test]
    fn test_larger_to_smaller_mask() {
        let old = net("172.20.0.0/16");
        let new = net("10.20.0.0/24");
        assert_eq!(
            remap_ip(Ipv4Addr::new(172, 20, 0, 9), &old, &new),
            Ok(Ipv4Addr::new(10, 20, 0, 9))
        );
        assert_eq!(
            remap_ip(Ipv4Addr::new(172, 20, 3, 9), &old, &new),
            Err(RemapFailure::OutsideNewSubnet)
        );
    }

    #[test]
    fn test_service_ips_partial() {
        let ips = BTreeMap::from([
            ("db".to_string(), Ipv4Addr::new(172, 20, 0, 5)),
            ("cache".to_string(), Ipv4Addr::new(192, 168, 1, 5)),
        ]);
        let (mapping, warnings) = remap_service_ips(&ips, &net("172.20.0.0/24"), &net("10.20.0.0/24"));
        assert_eq!(mapping.len(), 1);
        assert_eq!(mapping["db"], Ipv4Addr::new(10, 20, 0, 5));
        assert!(matches!(warnings[0], AllocationWarning::IpOutsideSubnet { ref service, .. } if service == "cache"));
    }

    mod proptest_tests {
        use super::*;

        proptest! {
            #[test]
            fn remap_is_offset_preserving_bijection(
                old_base in any::<u32>(),
                new_base in any::<u32>(),
                prefix in 8u8..=30,
                host in any::<u32>(),
            ) {
                let old = Ipv4Net::new(Ipv4Addr::from(old_base), prefix).expect("prefix").trunc();
                let new = Ipv4Net::new(Ipv4Addr::from(new_base), prefix).expect("prefix").trunc();
                let host_bits = u32::MAX >> prefix;
                let ip = Ipv4Addr::from(u32::from(old.network()) | (host & host_bits));

                let moved = remap_ip(ip, &old, &new).expect("equal masks always fit");
                prop_assert!(new.contains(&moved));
                prop_assert_eq!(
                    u32::from(moved) - u32::from(new.network()),
                    u32::from(ip) - u32::from(old.network())
                );
                prop_assert_eq!(remap_ip(moved, &new, &old), Ok(ip));
            }
        }
    }
}
