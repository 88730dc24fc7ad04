//! Post-pass over a resolution list.
//!
//! Resolutions merged from more than one pass may repeat a port. The
//! optimizer orders them by resolved port and bumps every repeat upward to
//! the next port that no other resolution holds and the ledger still has
//! free. Bumped ports are claimed in the ledger.

use std::collections::BTreeSet;

use tracing::{debug, warn};

use super::ledger::PortLedger;
use crate::error::AllocationWarning;
use crate::types::PortResolution;

/// Sort by resolved port and remove residual duplicates.
///
/// A bumped resolution has its reason annotated. One that cannot be placed
/// below 65536 is dropped and reported as a warning.
pub fn optimize_resolutions(
    mut resolutions: Vec<PortResolution>,
    ledger: &mut PortLedger,
) -> (Vec<PortResolution>, Vec<AllocationWarning>) {
    // Stable sort keeps input order among equal ports.
    resolutions.sort_by_key(|r| r.resolved_port);

    let mut held: BTreeSet<u16> = resolutions.iter().map(|r| r.resolved_port).collect();
    let mut seen = BTreeSet::new();
    let mut optimized = Vec::with_capacity(resolutions.len());
    let mut warnings = Vec::new();

    for mut resolution in resolutions {
        let original = resolution.resolved_port;
        if seen.insert(original) {
            optimized.push(resolution);
            continue;
        }

        let replacement = (u32::from(original) + 1..=u32::from(u16::MAX))
            .filter_map(|p| u16::try_from(p).ok())
            .find(|p| !held.contains(p) && ledger.is_available(*p));

        let Some(port) = replacement else {
            warn!(service = %resolution.service, port = original, "dropping resolution past the port ceiling");
            warnings.push(AllocationWarning::PortSpaceOverflow {
                service: resolution.service,
                port: resolution.original_port,
            });
            continue;
        };

        debug!(service = %resolution.service, from = original, to = port, "duplicate resolved port adjusted");
        held.insert(port);
        seen.insert(port);
        ledger.claim(port);
        resolution.resolved_port = port;
        resolution.reason = format!("{} (optimized from {original} to {port})", resolution.reason);
        optimized.push(resolution);
    }

    optimized.sort_by_key(|r| r.resolved_port);
    (optimized, warnings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    use crate::config::PortConfig;
    use crate::types::ResolutionStrategy;

    fn resolution(service: &str, resolved: u16) -> PortResolution {
        PortResolution {
            service: service.into(),
            binding_index: 0,
            original_port: 3000,
            resolved_port: resolved,
            strategy: ResolutionStrategy::AutoIncrement,
            reason: "test".into(),
            timestamp: Utc::now(),
        }
    }

    fn ledger(used: &[u16]) -> PortLedger {
        PortLedger::new(&used.iter().copied().collect(), &PortConfig::default())
    }

    #[test]
    fn test_sorted_without_duplicates_unchanged() {
        let input = vec![resolution("b", 8002), resolution("a", 8001)];
        let (out, warnings) = optimize_resolutions(input, &mut ledger(&[]));
        let ports: Vec<u16> = out.iter().map(|r| r.resolved_port).collect();
        assert_eq!(ports, vec![8001, 8002]);
        assert!(out.iter().all(|r| r.reason == "test"));
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_duplicate_bumped_and_annotated() {
        let input = vec![resolution("a", 8001), resolution("b", 8001), resolution("c", 8002)];
        let (out, _) = optimize_resolutions(input, &mut ledger(&[8003]));
        let ports: Vec<(&str, u16)> = out.iter().map(|r| (r.service.as_str(), r.resolved_port)).collect();
        assert_eq!(ports, vec![("a", 8001), ("c", 8002), ("b", 8004)]);
        assert_eq!(out[2].reason, "test (optimized from 8001 to 8004)");
    }

    #[test]
    fn test_overflow_dropped() {
        let input = vec![resolution("a", 65535), resolution("b", 65535)];
        let (out, warnings) = optimize_resolutions(input, &mut ledger(&[]));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].service, "a");
        assert_eq!(
            warnings,
            vec![AllocationWarning::PortSpaceOverflow {
                service: "b".into(),
                port: 3000,
            }]
        );
    }
}
