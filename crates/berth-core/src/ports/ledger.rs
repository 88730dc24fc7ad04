//! Run-scoped port exclusion set.

use std::collections::BTreeSet;

use crate::config::{PRIVILEGED_PORT_MAX, PortConfig};
use crate::types::{PortConflict, Service};

/// Ports that must not be handed out during a run.
///
/// Combines host-bound ports, configured reserved ports, the privileged
/// range (when excluded) and every port claimed so far. Claims only ever
/// grow, so sequential allocations never collide.
#[derive(Debug, Clone, Default)]
pub struct PortLedger {
    used: BTreeSet<u16>,
    reserved: BTreeSet<u16>,
    claimed: BTreeSet<u16>,
    exclude_privileged: bool,
}

impl PortLedger {
    /// Create a ledger from probed host ports and port settings.
    #[must_use]
    pub fn new(used: &BTreeSet<u16>, config: &PortConfig) -> Self {
        Self {
            used: used.clone(),
            reserved: config.reserved.iter().copied().collect(),
            claimed: BTreeSet::new(),
            exclude_privileged: config.exclude_privileged,
        }
    }

    /// Claim every requested host port that is not itself in conflict.
    ///
    /// Those ports stay bound as declared, so no replacement may land on them.
    pub fn claim_manifest_ports(&mut self, services: &[Service], conflicts: &[PortConflict]) {
        for service in services {
            for (index, binding) in service.bindings.iter().enumerate() {
                if !binding.publishes_host_port() {
                    continue;
                }
                let conflicting = conflicts
                    .iter()
                    .any(|c| c.service == service.name && c.binding_index == index);
                if !conflicting {
                    self.claimed.insert(binding.host_port);
                }
            }
        }
    }

    /// Returns true if `port` may be handed out.
    #[must_use]
    pub fn is_available(&self, port: u16) -> bool {
        port != 0
            && !(self.exclude_privileged && port <= PRIVILEGED_PORT_MAX)
            && !self.used.contains(&port)
            && !self.reserved.contains(&port)
            && !self.claimed.contains(&port)
    }

    /// Record `port` as taken. Returns false if it was already claimed.
    pub fn claim(&mut self, port: u16) -> bool {
        self.claimed.insert(port)
    }

    /// First available port in `from..=to`, if any.
    #[must_use]
    pub fn first_available(&self, from: u32, to: u32) -> Option<u16> {
        let to = to.min(u32::from(u16::MAX));
        (from..=to)
            .filter_map(|p| u16::try_from(p).ok())
            .find(|p| self.is_available(*p))
    }

    /// Ports claimed so far in this run.
    #[must_use]
    pub fn claimed(&self) -> &BTreeSet<u16> {
        &self.claimed
    }
}
