//! # berth-cli
//!
//! Command-line surface for `berth-core`.
//!
//! Provides commands for:
//! - Checking a project manifest against the host
//! - Resolving conflicts into a compose override file
//! - Recording host state as a replayable snapshot
//! - Generating a default configuration
//!
//! Manifests are read as JSON; turning a compose file into that form is
//! left to the caller.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod commands;
pub mod error;
pub mod output;

pub use cli::{Cli, Commands, Emit, Format, HostArgs, LogFormat, Runtime};
pub use error::CliError;
pub use output::OutputFormat;
