//! Existing-network enumeration through the container runtime CLI.
//!
//! Runs `<runtime> network ls -q` followed by one
//! `<runtime> network inspect <id> --format '{{json .}}'` per network and
//! decodes name and IPAM subnets from the JSON. Docker's `IPAM.Config[]`
//! layout and podman's top-level `subnets[]` layout are both accepted.

use std::process::Stdio;

use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, warn};

use super::{NetworkInfo, NetworkProbe};
use crate::error::{BerthError, Result};

#[derive(Debug, Deserialize)]
struct InspectedNetwork {
    #[serde(rename = "Name", alias = "name")]
    name: String,
    #[serde(rename = "IPAM", default)]
    ipam: Option<Ipam>,
    #[serde(default)]
    subnets: Vec<PodmanSubnet>,
}

#[derive(Debug, Deserialize)]
struct Ipam {
    #[serde(rename = "Config", default)]
    config: Option<Vec<IpamConfig>>,
}

#[derive(Debug, Deserialize)]
struct IpamConfig {
    #[serde(rename = "Subnet", default)]
    subnet: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PodmanSubnet {
    subnet: String,
}

/// Decode one `network inspect --format '{{json .}}'` document.
///
/// # Errors
///
/// Returns [`BerthError::ProbeFailed`] if the output is not the expected JSON.
pub fn parse_inspect_output(output: &[u8]) -> Result<NetworkInfo> {
    let network: InspectedNetwork = serde_json::from_slice(output).map_err(|e| {
        BerthError::probe_failed("docker", format!("failed to parse network inspect output: {e}"))
    })?;

    let mut subnets: Vec<String> = network
        .ipam
        .and_then(|ipam| ipam.config)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|c| c.subnet)
        .filter(|s| !s.is_empty())
        .collect();
    subnets.extend(network.subnets.into_iter().map(|s| s.subnet));

    Ok(NetworkInfo {
        name: network.name,
        subnets,
    })
}

/// [`NetworkProbe`] backed by the `docker` (or compatible) CLI.
#[derive(Debug, Clone)]
pub struct DockerNetworkProbe {
    program: String,
}

impl DockerNetworkProbe {
    /// Create a probe running `docker` from `PATH`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_program("docker")
    }

    /// Create a probe running another runtime CLI, e.g. `podman`.
    #[must_use]
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// The executable this probe runs.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    async fn run(&self, args: &[&str]) -> Result<std::process::Output> {
        Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                BerthError::probe_failed("docker", format!("failed to run {}: {e}", self.program))
            })
    }

    async fn list_network_ids(&self) -> Result<Vec<String>> {
        let output = self.run(&["network", "ls", "-q"]).await?;
        if !output.status.success() {
            return Err(BerthError::CommandFailed {
                command: format!("{} network ls -q", self.program),
                exit_code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }
}

impl Default for DockerNetworkProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkProbe for DockerNetworkProbe {
    fn name(&self) -> &str {
        "docker"
    }

    async fn detect_networks(&self) -> Result<Vec<NetworkInfo>> {
        let ids = self.list_network_ids().await?;
        let mut networks = Vec::with_capacity(ids.len());

        for id in ids {
            let output = self
                .run(&["network", "inspect", &id, "--format", "{{json .}}"])
                .await?;
            if !output.status.success() {
                // Removed between ls and inspect.
                let stderr = String::from_utf8_lossy(&output.stderr);
                warn!(
                    network_id = %id,
                    stderr = %stderr.trim(),
                    "skipping network that could not be inspected"
                );
                continue;
            }
            networks.push(parse_inspect_output(&output.stdout)?);
        }

        debug!(count = networks.len(), "detected container networks");
        Ok(networks)
    }
}
