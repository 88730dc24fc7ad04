//! The override document handed to the file writer.
//!
//! Only deltas appear: services whose ports or static addresses change, and
//! networks whose subnet changes. A service's `ports` list, when present, is
//! a full replacement of the original list (rendered with compose's `!reset`
//! tag so the merge does not append to the original bindings).

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::net::Ipv4Addr;

use chrono::{DateTime, SecondsFormat, Utc};
use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};

use crate::types::{NetworkResolution, PortBinding, PortResolution};

/// Generator identifier recorded in document metadata.
pub const GENERATOR: &str = concat!("berth ", env!("CARGO_PKG_VERSION"));

/// Static address override on one network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceNetworkOverride {
    /// Replacement static address.
    pub ipv4_address: Ipv4Addr,
}

/// Changes to one service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceOverride {
    /// Full replacement port list; empty when ports are unchanged.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<PortBinding>,
    /// Static address changes keyed by network name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub networks: BTreeMap<String, ServiceNetworkOverride>,
}

/// One IPAM pool entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpamConfig {
    /// Replacement subnet.
    pub subnet: Ipv4Net,
}

/// IPAM section of a network override.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ipam {
    /// Address pools.
    pub config: Vec<IpamConfig>,
}

/// Changes to one network.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkOverride {
    /// Replacement address management.
    pub ipam: Ipam,
}

/// Audit information carried alongside the overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverrideMetadata {
    /// When the run that produced this document started.
    pub generated_at: DateTime<Utc>,
    /// Producing tool and version.
    pub generator: String,
    /// Every applied port change.
    #[serde(default)]
    pub resolutions: Vec<PortResolution>,
    /// Every applied subnet change.
    #[serde(default)]
    pub network_resolutions: Vec<NetworkResolution>,
}

/// Minimal compose override for one project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverrideDocument {
    /// Project the overrides apply to.
    pub project_name: String,
    /// Service changes keyed by service name.
    #[serde(default)]
    pub services: BTreeMap<String, ServiceOverride>,
    /// Network changes keyed by network name.
    #[serde(default)]
    pub networks: BTreeMap<String, NetworkOverride>,
    /// Audit trail.
    pub metadata: OverrideMetadata,
}

impl OverrideDocument {
    /// Create a document with no overrides.
    #[must_use]
    pub fn empty(project_name: impl Into<String>, generated_at: DateTime<Utc>) -> Self {
        Self {
            project_name: project_name.into(),
            services: BTreeMap::new(),
            networks: BTreeMap::new(),
            metadata: OverrideMetadata {
                generated_at,
                generator: GENERATOR.to_string(),
                resolutions: Vec::new(),
                network_resolutions: Vec::new(),
            },
        }
    }

    /// Returns true if the document changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.services.is_empty() && self.networks.is_empty()
    }

    /// Render as a compose override file.
    #[must_use]
    pub fn to_compose_yaml(&self) -> String {
        let mut out = String::new();
        let generated_at = self.metadata.generated_at.to_rfc3339_opts(SecondsFormat::Secs, true);

        // Writing to a String cannot fail.
        let _ = writeln!(out, "# Compose override generated by {}", self.metadata.generator);
        let _ = writeln!(out, "# Generated at: {generated_at}");
        let _ = writeln!(out, "# Merge with the original file; only conflicting bindings change.");
        let _ = writeln!(out);
        let _ = writeln!(out, "name: {}", quote(&self.project_name));

        if !self.services.is_empty() {
            let _ = writeln!(out, "\nservices:");
            for (name, service) in &self.services {
                let _ = writeln!(out, "  {}:", key(name));
                if !service.ports.is_empty() {
                    let _ = writeln!(out, "    ports: !reset");
                    for binding in &service.ports {
                        let _ = writeln!(out, "      - {}", quote(&binding.to_string()));
                    }
                }
                if !service.networks.is_empty() {
                    let _ = writeln!(out, "    networks:");
                    for (network, attachment) in &service.networks {
                        let _ = writeln!(out, "      {}:", key(network));
                        let _ = writeln!(out, "        ipv4_address: {}", attachment.ipv4_address);
                    }
                }
            }
        }

        if !self.networks.is_empty() {
            let _ = writeln!(out, "\nnetworks:");
            for (name, network) in &self.networks {
                let _ = writeln!(out, "  {}:", key(name));
                let _ = writeln!(out, "    ipam:");
                let _ = writeln!(out, "      config:");
                for pool in &network.ipam.config {
                    let _ = writeln!(out, "        - subnet: {}", quote(&pool.subnet.to_string()));
                }
            }
        }

        let _ = writeln!(out, "\nx-berth-metadata:");
        let _ = writeln!(out, "  generated_at: {}", quote(&generated_at));
        let _ = writeln!(out, "  generator: {}", quote(&self.metadata.generator));
        if self.metadata.resolutions.is_empty() {
            let _ = writeln!(out, "  resolutions: []");
        } else {
            let _ = writeln!(out, "  resolutions:");
            for r in &self.metadata.resolutions {
                let _ = writeln!(out, "    - service: {}", quote(&r.service));
                let _ = writeln!(out, "      original_port: {}", r.original_port);
                let _ = writeln!(out, "      resolved_port: {}", r.resolved_port);
                let _ = writeln!(out, "      strategy: {}", r.strategy);
                let _ = writeln!(out, "      reason: {}", quote(&r.reason));
                let _ = writeln!(
                    out,
                    "      timestamp: {}",
                    quote(&r.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true))
                );
            }
        }
        if !self.metadata.network_resolutions.is_empty() {
            let _ = writeln!(out, "  network_resolutions:");
            for r in &self.metadata.network_resolutions {
                let _ = writeln!(out, "    - network: {}", quote(&r.network_name));
                let _ = writeln!(out, "      original_subnet: {}", quote(&r.original_subnet.to_string()));
                let _ = writeln!(out, "      resolved_subnet: {}", quote(&r.resolved_subnet.to_string()));
                let _ = writeln!(out, "      reason: {}", quote(&r.reason));
            }
        }

        out
    }
}

/// Double-quoted YAML scalar. JSON string syntax is a subset of it.
fn quote(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| format!("\"{value}\""))
}

/// Mapping key, quoted only when it is not a plain compose identifier.
fn key(value: &str) -> String {
    let plain = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if plain { value.to_string() } else { quote(value) }
}
