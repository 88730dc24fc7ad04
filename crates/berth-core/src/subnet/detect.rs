//! Network conflict detection.
//!
//! Manifest networks that declare a subnet are checked in declaration
//! order; networks without one are left to the runtime. A declared subnet
//! that overlaps an existing network (or an earlier manifest network) is a
//! `subnet` conflict; otherwise a runtime name that already exists is a
//! `name` conflict. Each processed network's subnet and name join the
//! ledger, so later networks in the same manifest are checked against it.

use tracing::{debug, info};

use super::ledger::SubnetLedger;
use crate::error::Result;
use crate::types::{Manifest, NetworkConflict, NetworkConflictKind};

/// Find every manifest network that collides with existing network state.
///
/// # Errors
///
/// Returns [`crate::BerthError::MalformedInput`] for an unparseable declared
/// subnet or static address on a conflicting network.
pub fn detect_network_conflicts(
    manifest: &Manifest,
    ledger: &mut SubnetLedger,
) -> Result<Vec<NetworkConflict>> {
    let mut conflicts = Vec::new();

    for network in &manifest.networks {
        let actual_name = manifest.actual_network_name(&network.name);
        let Some(subnet) = network.parsed_subnet()? else {
            ledger.claim_name(&actual_name);
            continue;
        };

        let conflict = if let Some(existing) = ledger.overlapping(&subnet) {
            Some(NetworkConflict {
                network_name: network.name.clone(),
                actual_name: actual_name.clone(),
                kind: NetworkConflictKind::Subnet,
                original_subnet: Some(subnet),
                description: format!("subnet {subnet} overlaps existing subnet {existing}"),
                service_ips: manifest.static_ips_on(&network.name)?,
            })
        } else if ledger.has_name(&actual_name) {
            Some(NetworkConflict {
                network_name: network.name.clone(),
                actual_name: actual_name.clone(),
                kind: NetworkConflictKind::Name,
                original_subnet: Some(subnet),
                description: format!(
                    "network {actual_name} already exists; use a different project name"
                ),
                service_ips: Default::default(),
            })
        } else {
            None
        };

        if let Some(conflict) = conflict {
            debug!(network = %network.name, kind = %conflict.kind, "network conflict detected");
            conflicts.push(conflict);
        }

        ledger.claim(subnet);
        ledger.claim_name(&actual_name);
    }

    info!(conflicts = conflicts.len(), "network conflict detection complete");
    Ok(conflicts)
}
