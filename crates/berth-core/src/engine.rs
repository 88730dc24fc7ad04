//! The run state machine.
//!
//! ```text
//! Idle ──► Detecting ──► Resolving ──► Building ──► Done
//!               │                                    ▲
//!               └──────────── no conflicts ──────────┘
//! ```
//!
//! Each phase is also callable on its own ([`ConflictEngine::detect`],
//! [`ConflictEngine::resolve`], [`ConflictEngine::build`]) so a caller that
//! wants to cancel can do so between phases. Within a phase allocation is
//! strictly sequential: every step reads the exclusion set the previous
//! step wrote.

use std::collections::BTreeSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::analysis::{ResolutionSummary, summarize};
use crate::builder::OverrideBuilder;
use crate::config::EngineConfig;
use crate::document::OverrideDocument;
use crate::error::{AllocationWarning, BerthError, Result};
use crate::ports::{PortLedger, detect_port_conflicts, optimize_resolutions, resolve_port_conflicts};
use crate::probe::{HostPortProbe, HostSnapshot, NetworkProbe};
use crate::subnet::{SubnetLedger, allocate_subnets, detect_network_conflicts};
use crate::types::{Manifest, NetworkConflict, NetworkResolution, PortConflict, PortResolution};

/// Phase of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunPhase {
    /// Nothing done yet.
    Idle,
    /// Comparing the manifest with host state.
    Detecting,
    /// Allocating replacement ports and subnets.
    Resolving,
    /// Assembling the override document.
    Building,
    /// Finished.
    Done,
}

/// Output of the detection phase.
#[derive(Debug, Clone)]
pub struct Detection {
    /// Port conflicts in manifest order.
    pub port_conflicts: Vec<PortConflict>,
    /// Network conflicts in manifest order.
    pub network_conflicts: Vec<NetworkConflict>,
    used_ports: BTreeSet<u16>,
    subnets: SubnetLedger,
}

impl Detection {
    /// Returns true if anything collides.
    #[must_use]
    pub fn has_conflicts(&self) -> bool {
        !self.port_conflicts.is_empty() || !self.network_conflicts.is_empty()
    }
}

/// Output of the resolution phase.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    /// Applied port changes, ordered by resolved port.
    pub port_resolutions: Vec<PortResolution>,
    /// Applied subnet changes.
    pub network_resolutions: Vec<NetworkResolution>,
    /// Everything that was skipped.
    pub warnings: Vec<AllocationWarning>,
}

/// Everything a run produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// Phases visited, in order.
    pub phases: Vec<RunPhase>,
    /// Detected port conflicts.
    pub port_conflicts: Vec<PortConflict>,
    /// Detected network conflicts.
    pub network_conflicts: Vec<NetworkConflict>,
    /// Applied changes and warnings.
    pub resolution: Resolution,
    /// Port resolution effectiveness.
    pub summary: ResolutionSummary,
    /// The override; empty when there was nothing to resolve.
    pub document: OverrideDocument,
}

impl RunReport {
    /// Returns true if the run short-circuited with nothing to change.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.port_conflicts.is_empty() && self.network_conflicts.is_empty()
    }
}

/// Detects and resolves port and subnet conflicts for one manifest at a time.
#[derive(Debug, Clone)]
pub struct ConflictEngine<P, N> {
    port_probe: P,
    network_probe: N,
    config: EngineConfig,
}

impl<P: HostPortProbe, N: NetworkProbe> ConflictEngine<P, N> {
    /// Create an engine from probes and configuration.
    #[must_use]
    pub fn new(port_probe: P, network_probe: N, config: EngineConfig) -> Self {
        Self {
            port_probe,
            network_probe,
            config,
        }
    }

    /// The engine configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Query both probes, each bounded by the configured timeout.
    ///
    /// # Errors
    ///
    /// Returns a probe failure if either probe errors or times out.
    pub async fn snapshot(&self) -> Result<HostSnapshot> {
        let secs = self.config.probe_timeout_secs;
        let limit = Duration::from_secs(secs);

        let used_ports = tokio::time::timeout(limit, self.port_probe.detect_used_ports())
            .await
            .map_err(|_| BerthError::ProbeTimeout {
                probe: self.port_probe.name().to_string(),
                timeout_secs: secs,
            })??;

        let networks = tokio::time::timeout(limit, self.network_probe.detect_networks())
            .await
            .map_err(|_| BerthError::ProbeTimeout {
                probe: self.network_probe.name().to_string(),
                timeout_secs: secs,
            })??;

        debug!(ports = used_ports.len(), networks = networks.len(), "host snapshot taken");
        Ok(HostSnapshot {
            used_ports,
            networks,
        })
    }

    /// Compare `manifest` against `snapshot`.
    ///
    /// # Errors
    ///
    /// Returns [`BerthError::MalformedInput`] for invalid manifest values.
    pub fn detect(&self, manifest: &Manifest, snapshot: &HostSnapshot) -> Result<Detection> {
        let port_conflicts = detect_port_conflicts(&manifest.services, &snapshot.used_ports);

        let mut subnets = SubnetLedger::from_networks(&snapshot.networks);
        let network_conflicts = detect_network_conflicts(manifest, &mut subnets)?;

        Ok(Detection {
            port_conflicts,
            network_conflicts,
            used_ports: snapshot.used_ports.clone(),
            subnets,
        })
    }

    /// Allocate replacements for every detected conflict.
    ///
    /// Consumes the detection so its subnet ledger carries straight into
    /// allocation.
    #[must_use]
    pub fn resolve(&self, manifest: &Manifest, detection: Detection, now: DateTime<Utc>) -> Resolution {
        let Detection {
            port_conflicts,
            network_conflicts,
            used_ports,
            mut subnets,
        } = detection;

        let mut ports = PortLedger::new(&used_ports, &self.config.port);
        ports.claim_manifest_ports(&manifest.services, &port_conflicts);

        let port_outcome = resolve_port_conflicts(
            &port_conflicts,
            &mut ports,
            &self.config.port,
            self.config.strategy,
            now,
        );
        let (port_resolutions, overflow) = optimize_resolutions(port_outcome.resolutions, &mut ports);

        let subnet_outcome = allocate_subnets(&network_conflicts, &mut subnets, &self.config.subnets);

        let mut warnings = port_outcome.warnings;
        warnings.extend(overflow);
        warnings.extend(subnet_outcome.warnings);

        Resolution {
            port_resolutions,
            network_resolutions: subnet_outcome.resolutions,
            warnings,
        }
    }

    /// Assemble and validate the override document.
    ///
    /// # Errors
    ///
    /// Returns [`BerthError::Validation`] if the resolutions are inconsistent.
    pub fn build(
        &self,
        manifest: &Manifest,
        resolution: &Resolution,
        now: DateTime<Utc>,
    ) -> Result<OverrideDocument> {
        OverrideBuilder::new(manifest, now)
            .build(&resolution.port_resolutions, &resolution.network_resolutions)
    }

    /// Run every phase for `manifest`, stamped with the current time.
    ///
    /// # Errors
    ///
    /// Returns an error on invalid configuration, malformed input, probe
    /// failure or validation failure. Exhausted ports or subnets are warnings in the report.
    pub async fn run(&self, manifest: &Manifest) -> Result<RunReport> {
        self.run_at(manifest, Utc::now()).await
    }

    /// Run every phase with a fixed timestamp.
    ///
    /// Identical manifest, probe output and `now` yield an identical report.
    ///
    /// # Errors
    ///
    /// See [`ConflictEngine::run`].
    pub async fn run_at(&self, manifest: &Manifest, now: DateTime<Utc>) -> Result<RunReport> {
        let mut phases = vec![RunPhase::Idle];
        self.config.validate()?;
        manifest.validate()?;

        phases.push(RunPhase::Detecting);
        let snapshot = self.snapshot().await?;
        let detection = self.detect(manifest, &snapshot)?;

        if !detection.has_conflicts() {
            phases.push(RunPhase::Done);
            info!(project = %manifest.project_name, "no conflicts detected");
            return Ok(RunReport {
                phases,
                port_conflicts: Vec::new(),
                network_conflicts: Vec::new(),
                resolution: Resolution::default(),
                summary: summarize(&[], &[]),
                document: OverrideDocument::empty(&manifest.project_name, now),
            });
        }

        info!(
            project = %manifest.project_name,
            port_conflicts = detection.port_conflicts.len(),
            network_conflicts = detection.network_conflicts.len(),
            "conflicts detected"
        );
        let port_conflicts = detection.port_conflicts.clone();
        let network_conflicts = detection.network_conflicts.clone();

        phases.push(RunPhase::Resolving);
        let resolution = self.resolve(manifest, detection, now);

        phases.push(RunPhase::Building);
        let document = self.build(manifest, &resolution, now)?;

        phases.push(RunPhase::Done);
        let summary = summarize(&port_conflicts, &resolution.port_resolutions);
        info!(
            project = %manifest.project_name,
            resolved_ports = resolution.port_resolutions.len(),
            resolved_networks = resolution.network_resolutions.len(),
            warnings = resolution.warnings.len(),
            "run complete"
        );

        Ok(RunReport {
            phases,
            port_conflicts,
            network_conflicts,
            resolution,
            summary,
            document,
        })
    }
}
