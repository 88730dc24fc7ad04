//! Engine configuration.
//!
//! Configuration for a resolution run, including:
//! - Port search range, reserved ports and privileged-port exclusion
//! - Port resolution strategy
//! - Subnet scan bands, in priority order
//! - Probe timeout

use std::net::Ipv4Addr;
use std::path::Path;

use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{BerthError, Result};
use crate::types::ResolutionStrategy;

/// Highest privileged port.
pub const PRIVILEGED_PORT_MAX: u16 = 1023;

/// Ranges wider than this are accepted but logged.
const WIDE_RANGE_WARN: u32 = 10_000;

/// Inclusive host port range searched for replacements.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PortRange {
    /// First port in the range.
    pub start: u16,
    /// Last port in the range (inclusive).
    pub end: u16,
}

impl PortRange {
    /// Create a range.
    #[must_use]
    pub const fn new(start: u16, end: u16) -> Self {
        Self { start, end }
    }

    /// Returns true if `port` lies in the range.
    #[must_use]
    pub const fn contains(&self, port: u16) -> bool {
        port >= self.start && port <= self.end
    }

    /// Number of ports in the range.
    #[must_use]
    pub fn len(&self) -> u32 {
        u32::from(self.end).saturating_sub(u32::from(self.start)) + 1
    }

    /// Returns true if the range is inverted.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.start > self.end
    }
}

impl Default for PortRange {
    fn default() -> Self {
        Self::new(8000, 9999)
    }
}

impl std::str::FromStr for PortRange {
    type Err = BerthError;

    /// Parse `START-END`.
    fn from_str(s: &str) -> Result<Self> {
        let (start, end) = s
            .split_once('-')
            .ok_or_else(|| BerthError::config(format!("port range must be START-END, got {s}")))?;
        let parse = |v: &str| {
            v.trim()
                .parse::<u16>()
                .map_err(|e| BerthError::config(format!("invalid port '{v}' in range {s}: {e}")))
        };
        Ok(Self::new(parse(start)?, parse(end)?))
    }
}

/// Port allocation settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PortConfig {
    /// Range replacement ports are drawn from.
    pub range: PortRange,
    /// Ports never handed out.
    pub reserved: Vec<u16>,
    /// Never hand out ports 1-1023.
    pub exclude_privileged: bool,
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            range: PortRange::default(),
            reserved: vec![8080, 8443, 9000, 9090],
            exclude_privileged: true,
        }
    }
}

/// One private address band scanned for replacement subnets.
///
/// Candidates are produced by setting the octet at `octet` of `base` to each
/// value in `first..=last` not listed in `exclude`, with prefix `prefix_len`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubnetBand {
    /// Template address.
    pub base: Ipv4Addr,
    /// Index of the varying octet (1 or 2).
    pub octet: usize,
    /// First value of the varying octet.
    pub first: u8,
    /// Last value of the varying octet (inclusive).
    pub last: u8,
    /// Octet values to skip.
    #[serde(default)]
    pub exclude: Vec<u8>,
    /// Prefix length of every candidate.
    pub prefix_len: u8,
}

impl SubnetBand {
    /// Candidate subnets of this band in scan order.
    ///
    /// A band whose `octet` is not an address position yields nothing.
    pub fn candidates(&self) -> impl Iterator<Item = Ipv4Net> + '_ {
        (self.first..=self.last)
            .filter(|value| !self.exclude.contains(value))
            .filter_map(|value| {
                let mut octets = self.base.octets();
                *octets.get_mut(self.octet)? = value;
                Ipv4Net::new(Ipv4Addr::from(octets), self.prefix_len)
                    .ok()
                    .map(|net| net.trunc())
            })
    }

    fn validate(&self, index: usize) -> Result<()> {
        if !(1..=2).contains(&self.octet) {
            return Err(BerthError::config(format!(
                "subnets.bands[{index}].octet must be 1 or 2"
            )));
        }
        if self.first > self.last {
            return Err(BerthError::config(format!(
                "subnets.bands[{index}]: first ({}) is greater than last ({})",
                self.first, self.last
            )));
        }
        if !(8..=30).contains(&self.prefix_len) {
            return Err(BerthError::config(format!(
                "subnets.bands[{index}].prefix_len must be in 8-30"
            )));
        }
        Ok(())
    }
}

/// Subnet allocation settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SubnetPolicy {
    /// Bands in priority order; the first free candidate wins.
    pub bands: Vec<SubnetBand>,
}

impl Default for SubnetPolicy {
    fn default() -> Self {
        Self {
            bands: vec![
                SubnetBand {
                    base: Ipv4Addr::new(10, 0, 0, 0),
                    octet: 1,
                    first: 20,
                    last: 255,
                    exclude: Vec::new(),
                    prefix_len: 24,
                },
                SubnetBand {
                    base: Ipv4Addr::new(192, 168, 0, 0),
                    octet: 2,
                    first: 100,
                    last: 255,
                    exclude: Vec::new(),
                    prefix_len: 24,
                },
                // Skip the runtime's default bridge pool.
                SubnetBand {
                    base: Ipv4Addr::new(172, 0, 0, 0),
                    octet: 1,
                    first: 16,
                    last: 31,
                    exclude: (17..=29).collect(),
                    prefix_len: 24,
                },
            ],
        }
    }
}

impl SubnetPolicy {
    /// All candidate subnets in priority order.
    pub fn candidates(&self) -> impl Iterator<Item = Ipv4Net> + '_ {
        self.bands.iter().flat_map(SubnetBand::candidates)
    }
}

/// Main engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EngineConfig {
    /// Port resolution strategy.
    pub strategy: ResolutionStrategy,
    /// Per-probe timeout in seconds.
    pub probe_timeout_secs: u64,
    /// Port allocation settings.
    pub port: PortConfig,
    /// Subnet allocation settings.
    pub subnets: SubnetPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            strategy: ResolutionStrategy::default(),
            probe_timeout_secs: 10,
            port: PortConfig::default(),
            subnets: SubnetPolicy::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            BerthError::config(format!(
                "failed to read config file '{}': {e}",
                path.as_ref().display()
            ))
        })?;

        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or fails validation.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| BerthError::config(format!("invalid TOML: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Render as TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| BerthError::config(format!("failed to encode config: {e}")))
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        let range = self.port.range;
        if range.start == 0 {
            return Err(BerthError::config("port.range.start must be at least 1"));
        }
        if range.is_empty() {
            return Err(BerthError::config(format!(
                "port.range.start ({}) is greater than port.range.end ({})",
                range.start, range.end
            )));
        }
        if self.port.exclude_privileged && range.end <= PRIVILEGED_PORT_MAX {
            return Err(BerthError::config(
                "port.range lies entirely in the privileged range while exclude_privileged is set",
            ));
        }
        if range.len() > WIDE_RANGE_WARN {
            warn!(start = range.start, end = range.end, "port range is unusually wide");
        }

        if self.probe_timeout_secs == 0 {
            return Err(BerthError::config(
                "probe_timeout_secs must be greater than 0",
            ));
        }

        for (index, band) in self.subnets.bands.iter().enumerate() {
            band.validate(index)?;
        }

        Ok(())
    }
}
