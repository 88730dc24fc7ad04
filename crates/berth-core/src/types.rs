//! Core data model: manifest input, detected conflicts, and resolutions.
//!
//! The manifest types mirror the parsed compose graph handed over by the
//! manifest parser. Service and network order is declaration order and is
//! load-bearing: detection and allocation walk it in sequence so that the
//! first claimant of a contended resource keeps it.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};

use crate::error::{BerthError, Result};

/// Default network driver.
pub const DEFAULT_DRIVER: &str = "bridge";

// ─────────────────────────────────────────────────────────────────────────────
// Manifest
// ─────────────────────────────────────────────────────────────────────────────

/// Transport protocol of a port binding.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// TCP (the compose default).
    #[default]
    Tcp,
    /// UDP.
    Udp,
    /// SCTP.
    Sctp,
}

impl Protocol {
    /// Lowercase protocol name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Udp => "udp",
            Self::Sctp => "sctp",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = BerthError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "tcp" => Ok(Self::Tcp),
            "udp" => Ok(Self::Udp),
            "sctp" => Ok(Self::Sctp),
            _ => Err(BerthError::malformed("protocol", s, "expected tcp, udp or sctp")),
        }
    }
}

/// A single published port of a service.
///
/// Serialized in compose short syntax: `[IP:]HOST:CONTAINER[/PROTO]`, or just
/// `CONTAINER[/PROTO]` when no host port is published.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PortBinding {
    /// Host port; 0 means the container port is not published.
    pub host_port: u16,
    /// Port inside the container (1-65535).
    pub container_port: u16,
    /// Transport protocol.
    pub protocol: Protocol,
    /// Host interface the port is bound on, if restricted.
    pub host_ip: Option<String>,
}

impl PortBinding {
    /// Create a TCP binding of `host_port` to `container_port`.
    #[must_use]
    pub fn new(host_port: u16, container_port: u16) -> Self {
        Self {
            host_port,
            container_port,
            protocol: Protocol::Tcp,
            host_ip: None,
        }
    }

    /// Set the protocol.
    #[must_use]
    pub fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self
    }

    /// Restrict the binding to a host interface.
    #[must_use]
    pub fn with_host_ip(mut self, ip: impl Into<String>) -> Self {
        self.host_ip = Some(ip.into());
        self
    }

    /// Returns true if a host port is published.
    #[must_use]
    pub const fn publishes_host_port(&self) -> bool {
        self.host_port != 0
    }

    /// Copy of this binding with the host port replaced.
    #[must_use]
    pub fn with_host_port(&self, host_port: u16) -> Self {
        Self {
            host_port,
            ..self.clone()
        }
    }

    /// Parse compose short syntax.
    ///
    /// # Errors
    ///
    /// Returns [`BerthError::MalformedInput`] carrying the text on any
    /// unparseable or out-of-range component.
    pub fn parse(spec: &str) -> Result<Self> {
        let malformed = |reason: &str| BerthError::malformed("port", spec, reason);
        let spec = spec.trim();
        if spec.is_empty() {
            return Err(malformed("empty port specification"));
        }

        let (addr, protocol) = match spec.split_once('/') {
            Some((addr, proto)) => {
                let protocol = proto
                    .parse::<Protocol>()
                    .map_err(|_| malformed("unknown protocol"))?;
                (addr, protocol)
            }
            None => (spec, Protocol::Tcp),
        };

        let mut parts = addr.rsplitn(3, ':');
        let container = parts.next().unwrap_or_default();
        let host = parts.next();
        let ip = parts.next();

        let container_port = parse_port(container).ok_or_else(|| malformed("invalid container port"))?;
        if container_port == 0 {
            return Err(malformed("container port must be in 1-65535"));
        }

        let host_port = match host {
            None | Some("") => 0,
            Some(h) => parse_port(h).ok_or_else(|| malformed("invalid host port"))?,
        };

        let host_ip = match ip {
            Some(ip) if !ip.is_empty() => {
                Some(ip.trim_start_matches('[').trim_end_matches(']').to_string())
            }
            Some(_) => return Err(malformed("empty host address")),
            None => None,
        };

        Ok(Self {
            host_port,
            container_port,
            protocol,
            host_ip,
        })
    }
}

fn parse_port(text: &str) -> Option<u16> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}

impl fmt::Display for PortBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ip) = &self.host_ip {
            if ip.contains(':') {
                write!(f, "[{ip}]:")?;
            } else {
                write!(f, "{ip}:")?;
            }
        }
        if self.host_port != 0 {
            write!(f, "{}:", self.host_port)?;
        } else if self.host_ip.is_some() {
            f.write_str(":")?;
        }
        write!(f, "{}", self.container_port)?;
        if self.protocol != Protocol::Tcp {
            write!(f, "/{}", self.protocol)?;
        }
        Ok(())
    }
}

impl FromStr for PortBinding {
    type Err = BerthError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for PortBinding {
    type Error = BerthError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<PortBinding> for String {
    fn from(binding: PortBinding) -> Self {
        binding.to_string()
    }
}

/// A service in the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    /// Service name, unique within the manifest.
    pub name: String,
    /// Published ports, in declaration order.
    #[serde(default, rename = "ports")]
    pub bindings: Vec<PortBinding>,
    /// Network attachments: network name to optional static IPv4 address.
    #[serde(default)]
    pub networks: BTreeMap<String, Option<String>>,
}

impl Service {
    /// Create a service with no ports or networks.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bindings: Vec::new(),
            networks: BTreeMap::new(),
        }
    }

    /// Add a port binding.
    #[must_use]
    pub fn with_binding(mut self, binding: PortBinding) -> Self {
        self.bindings.push(binding);
        self
    }

    /// Attach to a network, optionally with a static address.
    #[must_use]
    pub fn with_network(mut self, network: impl Into<String>, ip: Option<&str>) -> Self {
        self.networks.insert(network.into(), ip.map(str::to_string));
        self
    }

    /// Static IPv4 address on `network`, if one is declared.
    ///
    /// # Errors
    ///
    /// Returns [`BerthError::MalformedInput`] if the declared address is not
    /// a valid IPv4 address.
    pub fn static_ip(&self, network: &str) -> Result<Option<Ipv4Addr>> {
        match self.networks.get(network) {
            Some(Some(ip)) => ip
                .parse()
                .map(Some)
                .map_err(|_| BerthError::malformed("ipv4 address", ip, format!("static address of service {}", self.name))),
            _ => Ok(None),
        }
    }
}

/// A network declared in the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkSpec {
    /// Network name as declared (without project prefix).
    pub name: String,
    /// Declared subnet in CIDR notation.
    #[serde(default)]
    pub subnet: Option<String>,
    /// Network driver.
    #[serde(default = "default_driver")]
    pub driver: String,
}

fn default_driver() -> String {
    DEFAULT_DRIVER.to_string()
}

impl NetworkSpec {
    /// Create a bridge network with no declared subnet.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            subnet: None,
            driver: default_driver(),
        }
    }

    /// Declare a subnet.
    #[must_use]
    pub fn with_subnet(mut self, subnet: impl Into<String>) -> Self {
        self.subnet = Some(subnet.into());
        self
    }

    /// Parse the declared subnet, normalized to its network address.
    ///
    /// # Errors
    ///
    /// Returns [`BerthError::MalformedInput`] if the subnet is not IPv4 CIDR.
    pub fn parsed_subnet(&self) -> Result<Option<Ipv4Net>> {
        self.subnet
            .as_deref()
            .map(|cidr| {
                cidr.trim()
                    .parse::<Ipv4Net>()
                    .map(|net| net.trunc())
                    .map_err(|e| BerthError::malformed("subnet", cidr, format!("network {}: {e}", self.name)))
            })
            .transpose()
    }
}

/// The parsed service/network graph of one compose project.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Manifest {
    /// Project name; prefixes runtime network names.
    #[serde(alias = "name")]
    pub project_name: String,
    /// Services in declaration order.
    #[serde(default)]
    pub services: Vec<Service>,
    /// Networks in declaration order.
    #[serde(default)]
    pub networks: Vec<NetworkSpec>,
}

impl Manifest {
    /// Create an empty manifest for a project.
    #[must_use]
    pub fn new(project_name: impl Into<String>) -> Self {
        Self {
            project_name: project_name.into(),
            services: Vec::new(),
            networks: Vec::new(),
        }
    }

    /// Add a service.
    #[must_use]
    pub fn with_service(mut self, service: Service) -> Self {
        self.services.push(service);
        self
    }

    /// Add a network.
    #[must_use]
    pub fn with_network(mut self, network: NetworkSpec) -> Self {
        self.networks.push(network);
        self
    }

    /// Decode a manifest from JSON and validate it.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is invalid or the manifest fails
    /// [`Manifest::validate`].
    pub fn from_json(json: &str) -> Result<Self> {
        let manifest: Self = serde_json::from_str(json).map_err(|e| {
            BerthError::malformed("manifest", format!("line {}", e.line()), e.to_string())
        })?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Look up a service by name.
    #[must_use]
    pub fn service(&self, name: &str) -> Option<&Service> {
        self.services.iter().find(|s| s.name == name)
    }

    /// Look up a network by name.
    #[must_use]
    pub fn network(&self, name: &str) -> Option<&NetworkSpec> {
        self.networks.iter().find(|n| n.name == name)
    }

    /// Runtime-visible name of a declared network.
    #[must_use]
    pub fn actual_network_name(&self, network: &str) -> String {
        format!("{}_{network}", self.project_name)
    }

    /// Static addresses of every service attached to `network`.
    ///
    /// # Errors
    ///
    /// Returns [`BerthError::MalformedInput`] for an unparseable address.
    pub fn static_ips_on(&self, network: &str) -> Result<BTreeMap<String, Ipv4Addr>> {
        let mut ips = BTreeMap::new();
        for service in &self.services {
            if let Some(ip) = service.static_ip(network)? {
                ips.insert(service.name.clone(), ip);
            }
        }
        Ok(ips)
    }

    /// Check structural validity.
    ///
    /// Service and network names must be unique and non-empty, every
    /// declared subnet must be IPv4 CIDR and every static address IPv4.
    ///
    /// # Errors
    ///
    /// Returns [`BerthError::MalformedInput`] naming the first offending value.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for service in &self.services {
            if service.name.is_empty() {
                return Err(BerthError::malformed("service", "", "service name must not be empty"));
            }
            if !seen.insert(service.name.as_str()) {
                return Err(BerthError::malformed("service", &service.name, "duplicate service name"));
            }
            for binding in &service.bindings {
                if binding.container_port == 0 {
                    return Err(BerthError::malformed(
                        "port",
                        binding.to_string(),
                        format!("service {}: container port must be in 1-65535", service.name),
                    ));
                }
            }
            for network in service.networks.keys() {
                service.static_ip(network)?;
            }
        }

        let mut seen = HashSet::new();
        for network in &self.networks {
            if network.name.is_empty() {
                return Err(BerthError::malformed("network", "", "network name must not be empty"));
            }
            if !seen.insert(network.name.as_str()) {
                return Err(BerthError::malformed("network", &network.name, "duplicate network name"));
            }
            network.parsed_subnet()?;
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Conflicts and resolutions
// ─────────────────────────────────────────────────────────────────────────────

/// Why a port binding conflicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PortConflictKind {
    /// The port is already bound on the host.
    HostSystem,
    /// An earlier service in the same manifest claims the port.
    IntraManifest,
}

impl fmt::Display for PortConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HostSystem => f.write_str("host-system"),
            Self::IntraManifest => f.write_str("intra-manifest"),
        }
    }
}

/// A requested host port that cannot be used as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortConflict {
    /// Service owning the binding.
    pub service: String,
    /// Index of the binding within the service's port list.
    pub binding_index: usize,
    /// Requested host port.
    pub port: u16,
    /// Binding protocol.
    pub protocol: Protocol,
    /// Conflict classification.
    pub kind: PortConflictKind,
    /// Human-readable description.
    pub description: String,
}

/// Port selection strategy.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum ResolutionStrategy {
    /// Next free port after the requested one.
    #[default]
    #[serde(alias = "auto_increment")]
    AutoIncrement,
    /// A contiguous block of ports per service.
    #[serde(alias = "range_allocation")]
    RangeAllocation,
    /// Reserved for caller-supplied mappings; currently falls back to
    /// [`ResolutionStrategy::AutoIncrement`].
    #[serde(alias = "user_defined")]
    UserDefined,
}

impl ResolutionStrategy {
    /// Kebab-case strategy name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::AutoIncrement => "auto-increment",
            Self::RangeAllocation => "range-allocation",
            Self::UserDefined => "user-defined",
        }
    }
}

impl fmt::Display for ResolutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResolutionStrategy {
    type Err = BerthError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "auto-increment" | "auto" => Ok(Self::AutoIncrement),
            "range-allocation" | "range" => Ok(Self::RangeAllocation),
            "user-defined" | "user" => Ok(Self::UserDefined),
            _ => Err(BerthError::config(format!("unknown resolution strategy: {s}"))),
        }
    }
}

/// A replacement host port for a conflicting binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortResolution {
    /// Service owning the binding.
    pub service: String,
    /// Index of the binding within the service's port list.
    pub binding_index: usize,
    /// The conflicting port.
    pub original_port: u16,
    /// The replacement port.
    pub resolved_port: u16,
    /// Strategy that picked the replacement.
    pub strategy: ResolutionStrategy,
    /// Audit note.
    pub reason: String,
    /// When the resolution was made.
    pub timestamp: DateTime<Utc>,
}

/// Why a manifest network conflicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NetworkConflictKind {
    /// The declared subnet overlaps an existing or earlier network.
    Subnet,
    /// A network with the same runtime name already exists.
    Name,
}

impl fmt::Display for NetworkConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Subnet => f.write_str("subnet"),
            Self::Name => f.write_str("name"),
        }
    }
}

/// A manifest network that collides with existing network state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConflict {
    /// Network name as declared.
    pub network_name: String,
    /// Runtime-visible name (`project_network`).
    pub actual_name: String,
    /// Conflict classification.
    pub kind: NetworkConflictKind,
    /// The declared subnet.
    pub original_subnet: Option<Ipv4Net>,
    /// Human-readable description.
    pub description: String,
    /// Static addresses on this network that need remapping.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub service_ips: BTreeMap<String, Ipv4Addr>,
}

/// A replacement subnet for a conflicting network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkResolution {
    /// Network name as declared.
    pub network_name: String,
    /// The conflicting subnet.
    pub original_subnet: Ipv4Net,
    /// The replacement subnet.
    pub resolved_subnet: Ipv4Net,
    /// Remapped static addresses: service to new address.
    #[serde(default)]
    pub ip_address_mapping: BTreeMap<String, Ipv4Addr>,
    /// Audit note.
    pub reason: String,
}
