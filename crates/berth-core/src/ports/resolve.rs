//! Replacement port allocation.
//!
//! Conflicts are processed strictly in input order against a shared
//! [`PortLedger`]. Each successful allocation is claimed before the next
//! conflict is looked at, so no two resolutions of a run share a port. A
//! conflict for which no port can be found is skipped with an
//! [`AllocationWarning`]; the rest of the run proceeds.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::ledger::PortLedger;
use crate::config::{PortConfig, PortRange};
use crate::error::AllocationWarning;
use crate::types::{PortConflict, PortResolution, ResolutionStrategy};

/// Size of each service's block under range allocation.
pub const RANGE_BLOCK_SIZE: u32 = 100;

/// Result of a port resolution pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortOutcome {
    /// Applied resolutions.
    pub resolutions: Vec<PortResolution>,
    /// Conflicts that could not be resolved.
    pub warnings: Vec<AllocationWarning>,
}

/// Allocate replacement ports for `conflicts`.
///
/// `now` is stamped on every resolution so that identical inputs produce
/// identical output.
pub fn resolve_port_conflicts(
    conflicts: &[PortConflict],
    ledger: &mut PortLedger,
    config: &PortConfig,
    strategy: ResolutionStrategy,
    now: DateTime<Utc>,
) -> PortOutcome {
    let outcome = match strategy {
        ResolutionStrategy::AutoIncrement => auto_increment(conflicts, ledger, config.range, now),
        ResolutionStrategy::RangeAllocation => range_allocation(conflicts, ledger, config.range, now),
        ResolutionStrategy::UserDefined => {
            info!("user-defined strategy has no mappings; falling back to auto-increment");
            auto_increment(conflicts, ledger, config.range, now)
        }
    };

    info!(
        %strategy,
        resolved = outcome.resolutions.len(),
        skipped = outcome.warnings.len(),
        "port resolution complete"
    );
    outcome
}

/// Next free port after `port`, wrapping to the start of `range` once.
fn next_free(ledger: &PortLedger, port: u16, range: PortRange) -> Option<u16> {
    let start = (u32::from(port) + 1).max(u32::from(range.start));
    ledger
        .first_available(start, u32::from(range.end))
        .or_else(|| ledger.first_available(u32::from(range.start), u32::from(range.end)))
}

fn exhausted(conflict: &PortConflict, start: u16, end: u16) -> AllocationWarning {
    warn!(
        service = %conflict.service,
        port = conflict.port,
        range_start = start,
        range_end = end,
        "no available replacement port"
    );
    AllocationWarning::PortRangeExhausted {
        service: conflict.service.clone(),
        port: conflict.port,
        range_start: start,
        range_end: end,
    }
}

fn auto_increment(
    conflicts: &[PortConflict],
    ledger: &mut PortLedger,
    range: PortRange,
    now: DateTime<Utc>,
) -> PortOutcome {
    let mut outcome = PortOutcome::default();

    for conflict in conflicts {
        let Some(port) = next_free(ledger, conflict.port, range) else {
            outcome.warnings.push(exhausted(conflict, range.start, range.end));
            continue;
        };
        ledger.claim(port);
        debug!(service = %conflict.service, from = conflict.port, to = port, "port reassigned");

        outcome.resolutions.push(PortResolution {
            service: conflict.service.clone(),
            binding_index: conflict.binding_index,
            original_port: conflict.port,
            resolved_port: port,
            strategy: ResolutionStrategy::AutoIncrement,
            reason: format!(
                "{} conflict on port {}: next available port is {port}",
                conflict.kind, conflict.port
            ),
            timestamp: now,
        });
    }

    outcome
}

fn range_allocation(
    conflicts: &[PortConflict],
    ledger: &mut PortLedger,
    range: PortRange,
    now: DateTime<Utc>,
) -> PortOutcome {
    let mut outcome = PortOutcome::default();

    let mut services: Vec<&str> = Vec::new();
    for conflict in conflicts {
        if !services.contains(&conflict.service.as_str()) {
            services.push(&conflict.service);
        }
    }

    for (block, service) in (0u32..).zip(services) {
        let base = u32::from(range.start) + block * RANGE_BLOCK_SIZE;
        let end = (base + RANGE_BLOCK_SIZE - 1).min(u32::from(range.end));
        let clamp = |p: u32| u16::try_from(p).unwrap_or(u16::MAX);
        let mut cursor = base;

        for conflict in conflicts.iter().filter(|c| c.service == service) {
            let Some(port) = ledger.first_available(cursor, end) else {
                outcome.warnings.push(exhausted(conflict, clamp(base), clamp(end)));
                continue;
            };
            ledger.claim(port);
            cursor = u32::from(port) + 1;
            debug!(%service, from = conflict.port, to = port, block_start = base, "port reassigned");

            outcome.resolutions.push(PortResolution {
                service: conflict.service.clone(),
                binding_index: conflict.binding_index,
                original_port: conflict.port,
                resolved_port: port,
                strategy: ResolutionStrategy::RangeAllocation,
                reason: format!(
                    "{} conflict on port {}: assigned from {service}'s block {base}-{end}",
                    conflict.kind, conflict.port
                ),
                timestamp: now,
            });
        }
    }

    outcome
}

/// A candidate replacement offered for a conflict without claiming it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortSuggestion {
    /// Candidate port.
    pub port: u16,
    /// Strategy the candidate corresponds to.
    pub strategy: ResolutionStrategy,
    /// Human-readable note.
    pub reason: String,
}

/// Candidate replacements for a single conflict.
///
/// Offers the next free port and, for ports below `range`, the same port
/// number shifted into the range (`range.start + port % 1000`). The ledger is
/// not modified.
#[must_use]
pub fn suggest_alternatives(
    conflict: &PortConflict,
    ledger: &PortLedger,
    range: PortRange,
) -> Vec<PortSuggestion> {
    let mut suggestions = Vec::new();

    if let Some(port) = next_free(ledger, conflict.port, range) {
        suggestions.push(PortSuggestion {
            port,
            strategy: ResolutionStrategy::AutoIncrement,
            reason: format!("next available port after {}", conflict.port),
        });
    }

    if conflict.port < range.start {
        let shifted = u32::from(range.start) + u32::from(conflict.port % 1000);
        if let Ok(port) = u16::try_from(shifted) {
            if range.contains(port)
                && ledger.is_available(port)
                && suggestions.iter().all(|s| s.port != port)
            {
                suggestions.push(PortSuggestion {
                    port,
                    strategy: ResolutionStrategy::RangeAllocation,
                    reason: format!("port {} moved into the {}-{} range", conflict.port, range.start, range.end),
                });
            }
        }
    }

    suggestions
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    use proptest::prelude::*;

    use crate::types::{PortConflictKind, Protocol};

    fn conflict(service: &str, port: u16) -> PortConflict {
        PortConflict {
            service: service.into(),
            binding_index: 0,
            port,
            protocol: Protocol::Tcp,
            kind: PortConflictKind::HostSystem,
            description: String::new(),
        }
    }

    fn port_config(start: u16, end: u16) -> PortConfig {
        PortConfig {
            range: PortRange::new(start, end),
            ..PortConfig::default()
        }
    }

    fn resolve(
        conflicts: &[PortConflict],
        used: &[u16],
        config: &PortConfig,
        strategy: ResolutionStrategy,
    ) -> PortOutcome {
        let mut ledger = PortLedger::new(&used.iter().copied().collect(), config);
        resolve_port_conflicts(conflicts, &mut ledger, config, strategy, Utc::now())
    }

    #[test]
    fn test_auto_increment_next_port() {
        let config = port_config(3000, 4000);
        let outcome = resolve(&[conflict("api", 3000)], &[3000], &config, ResolutionStrategy::AutoIncrement);
        assert_eq!(outcome.resolutions.len(), 1);
        assert_eq!(outcome.resolutions[0].resolved_port, 3001);
        assert!(outcome.warnings.is_empty());
    }

    #[test]
    fn test_auto_increment_starts_at_range() {
        let config = port_config(8000, 9999);
        let outcome = resolve(&[conflict("web", 3000)], &[3000], &config, ResolutionStrategy::AutoIncrement);
        assert_eq!(outcome.resolutions[0].resolved_port, 8000);
    }

    #[test]
    fn test_auto_increment_skips_reserved_and_used() {
        let config = PortConfig {
            range: PortRange::new(8078, 8100),
            reserved: vec![8080],
            exclude_privileged: true,
        };
        let outcome = resolve(&[conflict("web", 8078)], &[8078, 8079], &config, ResolutionStrategy::AutoIncrement);
        assert_eq!(outcome.resolutions[0].resolved_port, 8081);
    }

    #[test]
    fn test_auto_increment_wraps_once() {
        let config = port_config(8000, 8010);
        let outcome = resolve(&[conflict("web", 8010)], &[8010], &config, ResolutionStrategy::AutoIncrement);
        assert_eq!(outcome.resolutions[0].resolved_port, 8000);
    }

    #[test]
    fn test_auto_increment_exhausted_is_warning() {
        let config = PortConfig {
            range: PortRange::new(8000, 8002),
            reserved: vec![8002],
            exclude_privileged: true,
        };
        let outcome = resolve(
            &[conflict("web", 3000)],
            &[8000, 8001],
            &config,
            ResolutionStrategy::AutoIncrement,
        );
        assert!(outcome.resolutions.is_empty());
        assert_eq!(
            outcome.warnings,
            vec![AllocationWarning::PortRangeExhausted {
                service: "web".into(),
                port: 3000,
                range_start: 8000,
                range_end: 8002,
            }]
        );
    }

    #[test]
    fn test_partial_resolution_continues() {
        let config = port_config(8000, 8000);
        let outcome = resolve(
            &[conflict("a", 3000), conflict("b", 3001)],
            &[3000, 3001],
            &config,
            ResolutionStrategy::AutoIncrement,
        );
        assert_eq!(outcome.resolutions.len(), 1);
        assert_eq!(outcome.resolutions[0].service, "a");
        assert_eq!(outcome.warnings.len(), 1);
    }

    #[test]
    fn test_same_original_port_first_service_wins_nearest() {
        let config = port_config(3000, 4000);
        let outcome = resolve(
            &[conflict("web", 3000), conflict("api", 3000)],
            &[3000],
            &config,
            ResolutionStrategy::AutoIncrement,
        );
        assert_eq!(outcome.resolutions[0].service, "web");
        assert_eq!(outcome.resolutions[0].resolved_port, 3001);
        assert_eq!(outcome.resolutions[1].resolved_port, 3002);
    }

    #[test]
    fn test_range_allocation_blocks_per_service() {
        let config = PortConfig {
            reserved: vec![],
            ..port_config(8000, 9999)
        };
        let conflicts = vec![
            conflict("web", 80),
            conflict("api", 3000),
            conflict("web", 443),
            conflict("db", 5432),
        ];
        let outcome = resolve(&conflicts, &[8001], &config, ResolutionStrategy::RangeAllocation);
        let ports: Vec<(&str, u16)> = outcome
            .resolutions
            .iter()
            .map(|r| (r.service.as_str(), r.resolved_port))
            .collect();
        assert_eq!(ports, vec![("web", 8000), ("web", 8002), ("api", 8100), ("db", 8200)]);
        assert!(outcome
            .resolutions
            .iter()
            .all(|r| r.strategy == ResolutionStrategy::RangeAllocation));
    }

    #[test]
    fn test_range_allocation_block_past_range_end() {
        let config = PortConfig {
            reserved: vec![],
            ..port_config(8000, 8150)
        };
        let conflicts = vec![conflict("a", 1), conflict("b", 2), conflict("c", 3)];
        let outcome = resolve(&conflicts, &[], &config, ResolutionStrategy::RangeAllocation);
        assert_eq!(outcome.resolutions.len(), 2);
        assert_eq!(outcome.resolutions[1].resolved_port, 8100);
        assert_eq!(outcome.warnings.len(), 1);
    }

    #[test]
    fn test_user_defined_falls_back() {
        let config = port_config(8000, 9999);
        let outcome = resolve(&[conflict("web", 3000)], &[3000], &config, ResolutionStrategy::UserDefined);
        assert_eq!(outcome.resolutions[0].resolved_port, 8000);
        assert_eq!(outcome.resolutions[0].strategy, ResolutionStrategy::AutoIncrement);
    }

    #[test]
    fn test_suggestions_do_not_claim() {
        let config = port_config(8000, 9999);
        let ledger = PortLedger::new(&BTreeSet::from([3000]), &config);
        let suggestions = suggest_alternatives(&conflict("web", 3000), &ledger, config.range);
        let ports: Vec<u16> = suggestions.iter().map(|s| s.port).collect();
        assert_eq!(ports, vec![8000]);
        assert!(ledger.claimed().is_empty());

        let suggestions = suggest_alternatives(&conflict("web", 3306), &ledger, config.range);
        let ports: Vec<u16> = suggestions.iter().map(|s| s.port).collect();
        assert_eq!(ports, vec![8000, 8306]);
    }

    mod proptest_tests {
        use super::*;

        proptest! {
            #[test]
            fn resolved_ports_unique_and_free(
                used in proptest::collection::btree_set(8000u16..8100, 0..60),
                requested in proptest::collection::vec(1u16..9000, 1..40),
                range_strategy in prop_oneof![
                    Just(ResolutionStrategy::AutoIncrement),
                    Just(ResolutionStrategy::RangeAllocation),
                ],
            ) {
                let config = PortConfig {
                    range: PortRange::new(8000, 8300),
                    reserved: vec![8080, 8200],
                    exclude_privileged: true,
                };
                let conflicts: Vec<PortConflict> = requested
                    .iter()
                    .enumerate()
                    .map(|(i, p)| conflict(&format!("svc{}", i % 5), *p))
                    .collect();
                let outcome = resolve(
                    &conflicts,
                    &used.iter().copied().collect::<Vec<_>>(),
                    &config,
                    range_strategy,
                );

                let mut seen = BTreeSet::new();
                for r in &outcome.resolutions {
                    prop_assert!(seen.insert(r.resolved_port), "duplicate {}", r.resolved_port);
                    prop_assert!(!used.contains(&r.resolved_port));
                    prop_assert!(!config.reserved.contains(&r.resolved_port));
                    prop_assert!(config.range.contains(r.resolved_port));
                }
                prop_assert_eq!(outcome.resolutions.len() + outcome.warnings.len(), conflicts.len());
            }
        }
    }
}
