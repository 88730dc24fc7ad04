//! Conflict severity and resolution effectiveness.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{PortConflict, PortConflictKind, PortResolution, ResolutionStrategy};

/// Ports whose displacement is most likely to break a developer workflow.
const WELL_KNOWN_PORTS: &[u16] = &[
    21, 22, 23, 25, 53, 80, 110, 143, 443, 993, 995, 3000, 3306, 5432, 6379, 8000, 8080, 9000,
];

/// How disruptive a conflict is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational.
    Low,
    /// Needs a replacement port.
    Medium,
    /// Collides with a well-known service or within the project itself.
    High,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => f.write_str("low"),
            Self::Medium => f.write_str("medium"),
            Self::High => f.write_str("high"),
        }
    }
}

/// Returns true for ports in the well-known list.
#[must_use]
pub fn is_well_known(port: u16) -> bool {
    WELL_KNOWN_PORTS.contains(&port)
}

/// Classify a conflict.
#[must_use]
pub fn severity(conflict: &PortConflict) -> Severity {
    match conflict.kind {
        PortConflictKind::HostSystem if is_well_known(conflict.port) => Severity::High,
        PortConflictKind::HostSystem => Severity::Medium,
        PortConflictKind::IntraManifest => Severity::High,
    }
}

/// Port band a resolved port falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PortBand {
    /// Below 1024.
    System,
    /// 1024-4999.
    Registered,
    /// 5000-7999.
    Custom,
    /// 8000-8999.
    Development,
    /// 9000 and above.
    High,
}

impl PortBand {
    /// Band of `port`.
    #[must_use]
    pub const fn of(port: u16) -> Self {
        match port {
            0..=1023 => Self::System,
            1024..=4999 => Self::Registered,
            5000..=7999 => Self::Custom,
            8000..=8999 => Self::Development,
            _ => Self::High,
        }
    }
}

/// Summary of a resolution pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolutionSummary {
    /// Conflicts detected.
    pub total_conflicts: usize,
    /// Conflicts resolved.
    pub resolved: usize,
    /// Conflicts skipped.
    pub unresolved: usize,
    /// `resolved / total_conflicts`, or 1.0 when there was nothing to do.
    pub success_rate: f64,
    /// Resolutions per strategy.
    pub by_strategy: BTreeMap<ResolutionStrategy, usize>,
    /// Resolutions per port band.
    pub by_band: BTreeMap<PortBand, usize>,
    /// Conflicts per severity.
    pub by_severity: BTreeMap<Severity, usize>,
}

/// Summarize how well `resolutions` covered `conflicts`.
#[must_use]
pub fn summarize(conflicts: &[PortConflict], resolutions: &[PortResolution]) -> ResolutionSummary {
    let mut summary = ResolutionSummary {
        total_conflicts: conflicts.len(),
        resolved: resolutions.len(),
        unresolved: conflicts.len().saturating_sub(resolutions.len()),
        success_rate: if conflicts.is_empty() {
            1.0
        } else {
            resolutions.len() as f64 / conflicts.len() as f64
        },
        ..ResolutionSummary::default()
    };

    for r in resolutions {
        *summary.by_strategy.entry(r.strategy).or_default() += 1;
        *summary.by_band.entry(PortBand::of(r.resolved_port)).or_default() += 1;
    }
    for c in conflicts {
        *summary.by_severity.entry(severity(c)).or_default() += 1;
    }
    summary
}
