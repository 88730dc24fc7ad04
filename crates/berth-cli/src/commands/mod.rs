//! CLI command implementations.
//!
//! Each submodule implements a specific CLI command:
//! - [`check`] - Conflict report with suggested replacements
//! - [`resolve`] - Full run producing an override document
//! - [`probe`] - Host state snapshot
//! - [`init_config`] - Default configuration

pub mod check;
pub mod init_config;
pub mod probe;
pub mod resolve;

pub use check::CheckCommand;
pub use init_config::InitConfigCommand;
pub use probe::ProbeCommand;
pub use resolve::ResolveCommand;

use std::path::Path;

use berth_core::{
    ConflictEngine, DockerNetworkProbe, EngineConfig, HostSnapshot, Manifest, NetstatProbe,
};
use tracing::debug;

use crate::cli::HostArgs;
use crate::error::CliError;

/// Load the engine configuration, or the defaults when no file is given.
///
/// # Errors
///
/// Returns an error if the file cannot be read or fails validation.
pub fn load_config(path: Option<&Path>) -> Result<EngineConfig, CliError> {
    match path {
        Some(path) => {
            debug!(path = %path.display(), "loading config");
            Ok(EngineConfig::from_file(path)?)
        }
        None => Ok(EngineConfig::default()),
    }
}

/// Read and validate a JSON manifest.
///
/// # Errors
///
/// Returns an error if the file cannot be read or the manifest is invalid.
pub fn load_manifest(path: &Path) -> Result<Manifest, CliError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        CliError::InvalidArgument(format!("cannot read manifest {}: {e}", path.display()))
    })?;
    Ok(Manifest::from_json(&content)?)
}

/// Host state from a recorded snapshot or from the live probes.
///
/// Live probing is bounded by the configured probe timeout.
///
/// # Errors
///
/// Returns an error if the snapshot cannot be loaded or a probe fails.
pub async fn host_snapshot(host: &HostArgs, config: &EngineConfig) -> Result<HostSnapshot, CliError> {
    if let Some(path) = &host.snapshot {
        debug!(path = %path.display(), "replaying host snapshot");
        return Ok(HostSnapshot::from_file(path)?);
    }

    let engine = ConflictEngine::new(
        NetstatProbe::with_program(&host.netstat),
        DockerNetworkProbe::with_program(host.runtime.program()),
        config.clone(),
    );
    Ok(engine.snapshot().await?)
}

/// Engine replaying a fixed host snapshot.
#[must_use]
pub fn replay_engine(
    snapshot: &HostSnapshot,
    config: EngineConfig,
) -> ConflictEngine<HostSnapshot, HostSnapshot> {
    ConflictEngine::new(snapshot.clone(), snapshot.clone(), config)
}

/// Write `content` to `path`, creating parent directories.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn write_file(path: &Path, content: &str) -> Result<(), CliError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)?;
    Ok(())
}
