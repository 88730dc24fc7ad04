//! Error types for conflict detection and resolution.
//!
//! Fatal conditions (a probe that cannot report host state, malformed
//! manifest values, an inconsistent override document) are [`BerthError`]s
//! and abort the run. Running out of ports or subnets is not an error: those
//! conditions are reported as [`AllocationWarning`]s and the run continues.

use std::fmt;
use std::net::Ipv4Addr;

use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for berth operations.
pub type Result<T> = std::result::Result<T, BerthError>;

/// Errors that abort a run.
#[derive(Debug, Error)]
pub enum BerthError {
    /// A host or network probe could not determine current state.
    #[error("{probe} probe failed: {message}")]
    ProbeFailed {
        /// Name of the probe.
        probe: String,
        /// Description of the failure.
        message: String,
    },

    /// A probe did not answer within the configured timeout.
    #[error("{probe} probe timed out after {timeout_secs} seconds")]
    ProbeTimeout {
        /// Name of the probe.
        probe: String,
        /// The timeout that expired.
        timeout_secs: u64,
    },

    /// An external command exited unsuccessfully.
    #[error("command failed: {command} exited with {exit_code}: {stderr}")]
    CommandFailed {
        /// The command that was executed.
        command: String,
        /// Exit code of the command (-1 when killed by a signal).
        exit_code: i32,
        /// Standard error output.
        stderr: String,
    },

    /// A manifest value could not be interpreted.
    #[error("malformed {entity} '{value}': {reason}")]
    MalformedInput {
        /// What kind of value was being read (port, subnet, service, ...).
        entity: String,
        /// The offending value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The override document is internally inconsistent.
    #[error("override validation failed: {message}")]
    Validation {
        /// Description of the inconsistency.
        message: String,
    },

    /// Invalid engine configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// JSON encoding or decoding failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse classification of a [`BerthError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    /// Host or network state could not be determined.
    ProbeFailure,
    /// An invalid port, CIDR or address in the input.
    MalformedInput,
    /// The override builder found an internal inconsistency.
    ValidationFailure,
    /// The engine configuration is unusable.
    Configuration,
    /// Local I/O or encoding failure.
    Io,
}

impl BerthError {
    /// Create a probe failure.
    pub fn probe_failed(probe: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ProbeFailed {
            probe: probe.into(),
            message: message.into(),
        }
    }

    /// Create a malformed-input error.
    pub fn malformed(
        entity: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::MalformedInput {
            entity: entity.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Create a validation failure.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Classify this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ProbeFailed { .. } | Self::ProbeTimeout { .. } | Self::CommandFailed { .. } => {
                ErrorKind::ProbeFailure
            }
            Self::MalformedInput { .. } => ErrorKind::MalformedInput,
            Self::Validation { .. } => ErrorKind::ValidationFailure,
            Self::Config(_) => ErrorKind::Configuration,
            Self::Json(_) | Self::Io(_) => ErrorKind::Io,
        }
    }

    /// Returns true if a caller may reasonably retry the run unchanged.
    ///
    /// Only probe failures depend on transient host state.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::ProbeFailure
    }
}

/// A non-fatal condition collected during allocation.
///
/// The affected conflict or address is skipped; everything else in the run
/// is still resolved and emitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum AllocationWarning {
    /// No free port was found for a conflicting binding.
    PortRangeExhausted {
        /// Service owning the binding.
        service: String,
        /// The requested host port.
        port: u16,
        /// Start of the searched range.
        range_start: u16,
        /// End of the searched range.
        range_end: u16,
    },

    /// Every subnet band is exhausted.
    SubnetPoolExhausted {
        /// Manifest network that could not be moved.
        network: String,
    },

    /// A static IP was not inside the subnet it is declared on.
    IpOutsideSubnet {
        /// Service owning the address.
        service: String,
        /// The address.
        ip: Ipv4Addr,
        /// The subnet it was expected in.
        subnet: Ipv4Net,
    },

    /// A remapped address would fall outside the new subnet.
    RemapOutOfRange {
        /// Service owning the address.
        service: String,
        /// The original address.
        ip: Ipv4Addr,
        /// The subnet the address was being moved to.
        subnet: Ipv4Net,
    },

    /// The optimizer could not place a duplicate below the port ceiling.
    PortSpaceOverflow {
        /// Service owning the dropped resolution.
        service: String,
        /// The port the resolution originally requested.
        port: u16,
    },
}

impl fmt::Display for AllocationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PortRangeExhausted {
                service,
                port,
                range_start,
                range_end,
            } => write!(
                f,
                "no available port in {range_start}-{range_end} for {service}:{port}"
            ),
            Self::SubnetPoolExhausted { network } => {
                write!(f, "no available subnet for network {network}")
            }
            Self::IpOutsideSubnet {
                service,
                ip,
                subnet,
            } => write!(f, "{service}: address {ip} is not in subnet {subnet}"),
            Self::RemapOutOfRange {
                service,
                ip,
                subnet,
            } => write!(f, "{service}: address {ip} cannot be remapped into {subnet}"),
            Self::PortSpaceOverflow { service, port } => {
                write!(f, "{service}:{port}: no free port left below 65536")
            }
        }
    }
}
