//! Conflict check command implementation.
//!
//! Runs detection only and lists every conflict with its severity and the
//! ports that would currently resolve it. Nothing is allocated.

use std::io::Write;

use berth_core::ports::{PortLedger, suggest_alternatives};
use berth_core::{EngineConfig, HostSnapshot, Manifest};

use super::{host_snapshot, load_manifest, replay_engine};
use crate::cli::CheckArgs;
use crate::error::CliError;
use crate::output::{CheckReport, OutputFormat, PortConflictRow};

/// Check command executor.
pub struct CheckCommand {
    config: EngineConfig,
}

impl CheckCommand {
    /// Create a new check command.
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    /// Execute the check command.
    ///
    /// # Errors
    ///
    /// Returns an error if the manifest is invalid, probing fails or output fails.
    pub async fn execute<W: Write>(
        &self,
        writer: &mut W,
        format: &OutputFormat,
        args: &CheckArgs,
    ) -> Result<(), CliError> {
        let manifest = load_manifest(&args.manifest)?;
        let snapshot = host_snapshot(&args.host, &self.config).await?;
        let report = self.check(&manifest, &snapshot)?;
        format.write(writer, &report)?;
        Ok(())
    }

    /// Detect conflicts against `snapshot`.
    ///
    /// # Errors
    ///
    /// Returns an error if the manifest holds malformed values.
    pub fn check(&self, manifest: &Manifest, snapshot: &HostSnapshot) -> Result<CheckReport, CliError> {
        let engine = replay_engine(snapshot, self.config.clone());
        let detection = engine.detect(manifest, snapshot)?;

        let mut ledger = PortLedger::new(&snapshot.used_ports, &self.config.port);
        ledger.claim_manifest_ports(&manifest.services, &detection.port_conflicts);

        let port_conflicts = detection
            .port_conflicts
            .iter()
            .map(|c| {
                let suggestions = suggest_alternatives(c, &ledger, self.config.port.range);
                PortConflictRow::new(c.clone(), suggestions)
            })
            .collect();

        Ok(CheckReport {
            project: manifest.project_name.clone(),
            port_conflicts,
            network_conflicts: detection.network_conflicts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use berth_core::{NetworkInfo, NetworkSpec, PortBinding, Service, Severity};

    fn manifest() -> Manifest {
        Manifest::new("shop")
            .with_service(Service::new("web").with_binding(PortBinding::new(80, 80)))
            .with_service(Service::new("api").with_binding(PortBinding::new(4123, 4123)))
            .with_network(NetworkSpec::new("app").with_subnet("172.20.0.0/24"))
    }

    #[test]
    fn test_check_reports_severity_and_suggestions() {
        let snapshot = HostSnapshot::new(
            [80, 4123, 8000],
            vec![NetworkInfo::new("other", &["172.20.0.0/16"])],
        );
        let report = CheckCommand::new(EngineConfig::default())
            .check(&manifest(), &snapshot)
            .expect("check");

        assert_eq!(report.port_conflicts.len(), 2);
        let web = &report.port_conflicts[0];
        assert_eq!(web.severity, Severity::High);
        let ports: Vec<u16> = web.suggestions.iter().map(|s| s.port).collect();
        // 8080 would be the shifted candidate but it is reserved.
        assert_eq!(ports, vec![8001]);

        let api = &report.port_conflicts[1];
        assert_eq!(api.severity, Severity::Medium);
        let ports: Vec<u16> = api.suggestions.iter().map(|s| s.port).collect();
        assert_eq!(ports, vec![8001, 8123]);
        assert_eq!(report.network_conflicts.len(), 1);
    }

    #[test]
    fn test_check_clean() {
        let report = CheckCommand::new(EngineConfig::default())
            .check(&manifest(), &HostSnapshot::default())
            .expect("check");
        assert!(report.is_clean());
    }
}
