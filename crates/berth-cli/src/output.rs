//! Output formatting for CLI commands.
//!
//! Supports table (human-readable) and JSON output formats.

use std::io::Write;

use berth_core::analysis::severity;
use berth_core::ports::PortSuggestion;
use berth_core::{HostSnapshot, NetworkConflict, PortConflict, RunReport, Severity};
use serde::Serialize;

use crate::cli::Format;
use crate::error::CliError;

/// Output formatter that handles both table and JSON output.
#[derive(Debug, Clone)]
pub struct OutputFormat {
    format: Format,
}

impl OutputFormat {
    /// Create a new output formatter.
    #[must_use]
    pub const fn new(format: Format) -> Self {
        Self { format }
    }

    /// Get the current format.
    #[must_use]
    pub const fn format(&self) -> Format {
        self.format
    }

    /// Check if JSON format is selected.
    #[must_use]
    pub const fn is_json(&self) -> bool {
        matches!(self.format, Format::Json)
    }

    /// Write a serializable value to the output.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn write<W, T>(&self, writer: &mut W, value: &T) -> Result<(), CliError>
    where
        W: Write,
        T: Serialize + TableDisplay,
    {
        match self.format {
            Format::Json => {
                serde_json::to_writer_pretty(&mut *writer, value)
                    .map_err(|e| CliError::Format(format!("JSON serialization failed: {e}")))?;
                writeln!(writer)?;
            }
            Format::Table => {
                value.write_table(writer)?;
            }
        }
        Ok(())
    }
}

impl Default for OutputFormat {
    fn default() -> Self {
        Self::new(Format::Table)
    }
}

/// Trait for types that can be displayed as a table.
pub trait TableDisplay {
    /// Write the value as a human-readable table.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError>;
}

/// A port conflict with its severity and candidate replacements.
#[derive(Debug, Clone, Serialize)]
pub struct PortConflictRow {
    /// The conflict.
    #[serde(flatten)]
    pub conflict: PortConflict,
    /// How disruptive it is.
    pub severity: Severity,
    /// Ports that would currently resolve it.
    pub suggestions: Vec<PortSuggestion>,
}

impl PortConflictRow {
    /// Wrap a conflict with its severity.
    #[must_use]
    pub fn new(conflict: PortConflict, suggestions: Vec<PortSuggestion>) -> Self {
        Self {
            severity: severity(&conflict),
            conflict,
            suggestions,
        }
    }
}

/// Result of `berth check`.
#[derive(Debug, Clone, Serialize)]
pub struct CheckReport {
    /// Project that was checked.
    pub project: String,
    /// Port conflicts in manifest order.
    pub port_conflicts: Vec<PortConflictRow>,
    /// Network conflicts in manifest order.
    pub network_conflicts: Vec<NetworkConflict>,
}

impl CheckReport {
    /// Returns true if nothing collides.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.port_conflicts.is_empty() && self.network_conflicts.is_empty()
    }
}

impl TableDisplay for CheckReport {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        writeln!(writer, "Project: {}", self.project)?;
        writeln!(writer, "══════════════════════════════════")?;
        if self.is_clean() {
            writeln!(writer, "No conflicts detected.")?;
            return Ok(());
        }

        if !self.port_conflicts.is_empty() {
            writeln!(writer)?;
            writeln!(
                writer,
                "{:<16} {:>6} {:<6} {:<15} {:<8} SUGGESTIONS",
                "SERVICE", "PORT", "PROTO", "KIND", "SEVERITY"
            )?;
            for row in &self.port_conflicts {
                let suggestions: Vec<String> = row.suggestions.iter().map(|s| s.port.to_string()).collect();
                writeln!(
                    writer,
                    "{:<16} {:>6} {:<6} {:<15} {:<8} {}",
                    row.conflict.service,
                    row.conflict.port,
                    row.conflict.protocol.to_string(),
                    row.conflict.kind.to_string(),
                    row.severity.to_string(),
                    if suggestions.is_empty() { "-".to_string() } else { suggestions.join(", ") }
                )?;
            }
        }

        if !self.network_conflicts.is_empty() {
            writeln!(writer)?;
            writeln!(writer, "Networks")?;
            for conflict in &self.network_conflicts {
                writeln!(writer, "  {}: {}", conflict.network_name, conflict.description)?;
            }
        }
        Ok(())
    }
}

impl TableDisplay for RunReport {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        writeln!(writer, "Project: {}", self.document.project_name)?;
        writeln!(writer, "══════════════════════════════════")?;
        if self.is_clean() {
            writeln!(writer, "No conflicts detected.")?;
            return Ok(());
        }

        writeln!(
            writer,
            "Ports:     {} of {} conflicts resolved ({:.0}%)",
            self.summary.resolved,
            self.summary.total_conflicts,
            self.summary.success_rate * 100.0
        )?;
        for r in &self.resolution.port_resolutions {
            writeln!(
                writer,
                "  {:<16} {:>6} -> {:<6} {}",
                r.service, r.original_port, r.resolved_port, r.strategy
            )?;
        }

        writeln!(writer, "Networks:  {} moved", self.resolution.network_resolutions.len())?;
        for r in &self.resolution.network_resolutions {
            writeln!(writer, "  {:<16} {} -> {}", r.network_name, r.original_subnet, r.resolved_subnet)?;
            for (service, ip) in &r.ip_address_mapping {
                writeln!(writer, "    {service:<14} {ip}")?;
            }
        }

        if !self.resolution.warnings.is_empty() {
            writeln!(writer)?;
            writeln!(writer, "Warnings")?;
            for warning in &self.resolution.warnings {
                writeln!(writer, "  {warning}")?;
            }
        }
        Ok(())
    }
}

impl TableDisplay for HostSnapshot {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        writeln!(writer, "Bound ports ({})", self.used_ports.len())?;
        let ports: Vec<String> = self.used_ports.iter().map(u16::to_string).collect();
        for chunk in ports.chunks(12) {
            writeln!(writer, "  {}", chunk.join(" "))?;
        }
        writeln!(writer)?;
        writeln!(writer, "Networks ({})", self.networks.len())?;
        for network in &self.networks {
            writeln!(writer, "  {:<32} {}", network.name, network.subnets.join(", "))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use berth_core::{NetworkInfo, PortConflictKind, Protocol, ResolutionStrategy};

    fn conflict() -> PortConflict {
        PortConflict {
            service: "web".into(),
            binding_index: 0,
            port: 3000,
            protocol: Protocol::Tcp,
            kind: PortConflictKind::HostSystem,
            description: "port 3000 is already bound on the host".into(),
        }
    }

    fn render<T: Serialize + TableDisplay>(format: Format, value: &T) -> String {
        let mut buf = Vec::new();
        OutputFormat::new(format).write(&mut buf, value).expect("write");
        String::from_utf8(buf).expect("utf8")
    }

    #[test]
    fn test_check_table() {
        let report = CheckReport {
            project: "shop".into(),
            port_conflicts: vec![PortConflictRow::new(
                conflict(),
                vec![PortSuggestion {
                    port: 8000,
                    strategy: ResolutionStrategy::AutoIncrement,
                    reason: String::new(),
                }],
            )],
            network_conflicts: Vec::new(),
        };
        let out = render(Format::Table, &report);
        assert!(out.contains("Project: shop"));
        assert!(out.contains("host-system"));
        assert!(out.contains("high"));
        assert!(out.contains("8000"));
    }

    #[test]
    fn test_check_json_flattens_conflict() {
        let report = CheckReport {
            project: "shop".into(),
            port_conflicts: vec![PortConflictRow::new(conflict(), Vec::new())],
            network_conflicts: Vec::new(),
        };
        let value: serde_json::Value = serde_json::from_str(&render(Format::Json, &report)).expect("json");
        assert_eq!(value["port_conflicts"][0]["service"], "web");
        assert_eq!(value["port_conflicts"][0]["severity"], "high");
    }

    #[test]
    fn test_clean_check_table() {
        let report = CheckReport {
            project: "shop".into(),
            port_conflicts: Vec::new(),
            network_conflicts: Vec::new(),
        };
        assert!(render(Format::Table, &report).contains("No conflicts detected."));
    }

    #[test]
    fn test_snapshot_table() {
        let snapshot = HostSnapshot::new([22, 80], vec![NetworkInfo::new("bridge", &["172.17.0.0/16"])]);
        let out = render(Format::Table, &snapshot);
        assert!(out.contains("Bound ports (2)"));
        assert!(out.contains("22 80"));
        assert!(out.contains("172.17.0.0/16"));
    }
}
