//! Host and container-runtime state probes.
//!
//! The engine never enumerates sockets or networks itself. It asks a
//! [`HostPortProbe`] for the ports currently bound on the host and a
//! [`NetworkProbe`] for the networks the container runtime already knows
//! about. Production probes shell out ([`netstat`], [`docker`]); tests and
//! replays use [`HostSnapshot`].
//!
//! A probe failure is fatal to a run: allocation without ground truth could
//! hand out a port or subnet that is already taken.

pub mod docker;
pub mod netstat;

use std::collections::BTreeSet;
use std::future::Future;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::PortRange;
use crate::error::{BerthError, Result};

pub use docker::DockerNetworkProbe;
pub use netstat::NetstatProbe;

/// An existing container network as reported by the runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkInfo {
    /// Runtime-visible network name.
    pub name: String,
    /// Subnets in CIDR notation (IPv6 entries are carried but ignored).
    #[serde(default)]
    pub subnets: Vec<String>,
}

impl NetworkInfo {
    /// Create a network entry.
    #[must_use]
    pub fn new(name: impl Into<String>, subnets: &[&str]) -> Self {
        Self {
            name: name.into(),
            subnets: subnets.iter().map(|s| (*s).to_string()).collect(),
        }
    }
}

/// Source of currently bound host ports.
#[allow(async_fn_in_trait)]
pub trait HostPortProbe: Send + Sync {
    /// Short probe name used in errors and logs.
    fn name(&self) -> &str;

    /// Every port currently in a listening or bound state.
    fn detect_used_ports(&self) -> impl Future<Output = Result<BTreeSet<u16>>> + Send;

    /// Bound ports restricted to `range`.
    fn detect_used_ports_in_range(
        &self,
        range: PortRange,
    ) -> impl Future<Output = Result<BTreeSet<u16>>> + Send {
        async move {
            let ports = self.detect_used_ports().await?;
            Ok(ports.into_iter().filter(|p| range.contains(*p)).collect())
        }
    }
}

/// Source of existing container networks.
#[allow(async_fn_in_trait)]
pub trait NetworkProbe: Send + Sync {
    /// Short probe name used in errors and logs.
    fn name(&self) -> &str;

    /// Every network the container runtime knows about.
    fn detect_networks(&self) -> impl Future<Output = Result<Vec<NetworkInfo>>> + Send;
}

/// Point-in-time host state: bound ports and existing networks.
///
/// A snapshot is also a probe of both kinds that replays itself, so a run
/// can be repeated against recorded state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostSnapshot {
    /// Ports bound on the host.
    #[serde(default)]
    pub used_ports: BTreeSet<u16>,
    /// Existing container networks.
    #[serde(default)]
    pub networks: Vec<NetworkInfo>,
}

impl HostSnapshot {
    /// Create a snapshot.
    #[must_use]
    pub fn new(used_ports: impl IntoIterator<Item = u16>, networks: Vec<NetworkInfo>) -> Self {
        Self {
            used_ports: used_ports.into_iter().collect(),
            networks,
        }
    }

    /// Load a snapshot from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or decoded.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            BerthError::malformed(
                "snapshot",
                path.as_ref().display().to_string(),
                format!("cannot read: {e}"),
            )
        })?;
        serde_json::from_str(&content).map_err(|e| {
            BerthError::malformed("snapshot", path.as_ref().display().to_string(), e.to_string())
        })
    }
}

impl HostPortProbe for HostSnapshot {
    fn name(&self) -> &str {
        "snapshot"
    }

    async fn detect_used_ports(&self) -> Result<BTreeSet<u16>> {
        Ok(self.used_ports.clone())
    }
}

impl NetworkProbe for HostSnapshot {
    fn name(&self) -> &str {
        "snapshot"
    }

    async fn detect_networks(&self) -> Result<Vec<NetworkInfo>> {
        Ok(self.networks.clone())
    }
}
