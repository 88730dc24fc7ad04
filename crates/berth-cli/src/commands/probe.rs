//! Host probe command implementation.
//!
//! Prints the bound ports and container networks the engine would see. In
//! JSON mode the output is a snapshot file that `--snapshot` can replay.

use std::io::Write;

use berth_core::EngineConfig;

use super::host_snapshot;
use crate::cli::HostArgs;
use crate::error::CliError;
use crate::output::OutputFormat;

/// Probe command executor.
pub struct ProbeCommand {
    config: EngineConfig,
}

impl ProbeCommand {
    /// Create a new probe command.
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    /// Execute the probe command.
    ///
    /// # Errors
    ///
    /// Returns an error if a probe fails or output fails.
    pub async fn execute<W: Write>(
        &self,
        writer: &mut W,
        format: &OutputFormat,
        args: &HostArgs,
    ) -> Result<(), CliError> {
        let snapshot = host_snapshot(args, &self.config).await?;
        format.write(writer, &snapshot)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use berth_core::{HostSnapshot, NetworkInfo};

    use crate::cli::{Format, Runtime};

    #[tokio::test]
    async fn test_probe_replays_snapshot_as_json() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("host.json");
        let snapshot = HostSnapshot::new([22, 5432], vec![NetworkInfo::new("bridge", &["172.17.0.0/16"])]);
        std::fs::write(&path, serde_json::to_string(&snapshot).expect("encode")).expect("write");

        let args = HostArgs {
            snapshot: Some(path),
            runtime: Runtime::Docker,
            netstat: "netstat".into(),
        };
        let mut out = Vec::new();
        ProbeCommand::new(EngineConfig::default())
            .execute(&mut out, &OutputFormat::new(Format::Json), &args)
            .await
            .expect("probe");

        let back: HostSnapshot = serde_json::from_slice(&out).expect("decode");
        assert_eq!(back, snapshot);
    }

    #[tokio::test]
    async fn test_missing_probe_program_fails() {
        let args = HostArgs {
            snapshot: None,
            runtime: Runtime::Docker,
            netstat: "/nonexistent/berth-netstat".into(),
        };
        let mut out = Vec::new();
        let err = ProbeCommand::new(EngineConfig::default())
            .execute(&mut out, &OutputFormat::default(), &args)
            .await
            .expect_err("no such program");
        assert_eq!(err.exit_code(), 3);
    }
}
