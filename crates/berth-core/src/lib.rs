//! # berth-core
//!
//! Port and subnet conflict resolution for compose projects sharing a host.
//!
//! Given a parsed project manifest and the current host state, the engine:
//! - finds host ports the project wants that are already bound, or that two
//!   of its own bindings both claim
//! - picks replacement ports from a configured range
//! - finds project networks whose subnet overlaps an existing network
//! - allocates replacement subnets from priority bands and remaps static
//!   service addresses into them
//! - emits a minimal override document describing only the changes
//!
//! # Architecture
//!
//! ```text
//! ┌──────────┐   ┌────────────┐   ┌─────────────┐   ┌──────────────────┐
//! │ Manifest │──►│   detect   │──►│   resolve   │──►│  OverrideBuilder │
//! └──────────┘   └────────────┘   └─────────────┘   └──────────────────┘
//!                      ▲                 ▲                   │
//!               ┌──────┴──────┐   ┌──────┴───────┐           ▼
//!               │   probes    │   │ PortLedger / │   OverrideDocument
//!               │ (netstat,   │   │ SubnetLedger │
//!               │  docker)    │   └──────────────┘
//!               └─────────────┘
//! ```
//!
//! Parsing compose files and writing the override to disk are left to the
//! caller.

#![forbid(unsafe_code)]

pub mod analysis;
pub mod builder;
pub mod config;
pub mod document;
pub mod engine;
pub mod error;
pub mod ports;
pub mod probe;
pub mod subnet;
pub mod types;

pub use analysis::{ResolutionSummary, Severity, summarize};
pub use builder::{OverrideBuilder, validate_document};
pub use config::{EngineConfig, PortConfig, PortRange, SubnetBand, SubnetPolicy};
pub use document::OverrideDocument;
pub use engine::{ConflictEngine, Detection, Resolution, RunPhase, RunReport};
pub use error::{AllocationWarning, BerthError, ErrorKind, Result};
pub use probe::{
    DockerNetworkProbe, HostPortProbe, HostSnapshot, NetstatProbe, NetworkInfo, NetworkProbe,
};
pub use types::{
    Manifest, NetworkConflict, NetworkConflictKind, NetworkResolution, NetworkSpec, PortBinding,
    PortConflict, PortConflictKind, PortResolution, Protocol, ResolutionStrategy, Service,
};
