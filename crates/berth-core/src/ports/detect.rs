//! Port conflict detection.
//!
//! Every binding that publishes a host port is checked in manifest order:
//! a port already bound on the host is a `host-system` conflict; otherwise a
//! port already requested by an earlier binding is an `intra-manifest`
//! conflict. The first claimant is never flagged.

use std::collections::{BTreeSet, HashMap};

use tracing::{debug, info};

use crate::types::{PortConflict, PortConflictKind, Service};

/// Find every requested host port that cannot be bound as declared.
///
/// Output order is manifest order (services, then bindings within a
/// service), so resolution order is reproducible.
#[must_use]
pub fn detect_port_conflicts(services: &[Service], used_ports: &BTreeSet<u16>) -> Vec<PortConflict> {
    let mut conflicts = Vec::new();
    let mut claimed: HashMap<u16, &str> = HashMap::new();

    for service in services {
        for (index, binding) in service.bindings.iter().enumerate() {
            if !binding.publishes_host_port() {
                continue;
            }
            let port = binding.host_port;

            let (kind, description) = if used_ports.contains(&port) {
                (
                    PortConflictKind::HostSystem,
                    format!("port {port} is already in use on the host"),
                )
            } else if let Some(owner) = claimed.get(&port) {
                let description = if *owner == service.name {
                    format!("port {port} is requested twice by {owner}")
                } else {
                    format!("port {port} is requested by both {owner} and {}", service.name)
                };
                (PortConflictKind::IntraManifest, description)
            } else {
                claimed.insert(port, &service.name);
                continue;
            };

            debug!(service = %service.name, port, %kind, "port conflict detected");
            conflicts.push(PortConflict {
                service: service.name.clone(),
                binding_index: index,
                port,
                protocol: binding.protocol,
                kind,
                description,
            });
        }
    }

    info!(conflicts = conflicts.len(), "port conflict detection complete");
    conflicts
}
