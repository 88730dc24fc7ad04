//! Command-line argument parsing with clap.

use std::path::PathBuf;

use berth_core::{PortRange, ResolutionStrategy};
use clap::{Args, Parser, Subcommand, ValueEnum};

/// berth - keep compose projects from fighting over ports and subnets.
#[derive(Parser, Debug, Clone)]
#[command(name = "berth")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Engine configuration file (TOML).
    #[arg(short, long, global = true, env = "BERTH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output format.
    #[arg(short, long, global = true, value_enum, default_value_t = Format::Table)]
    pub format: Format,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Enable debug logging.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Format {
    /// Human-readable table format.
    #[default]
    Table,
    /// JSON output for scripting.
    Json,
}

/// Log format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

/// Rendering of the override document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Emit {
    /// Compose override file.
    #[default]
    Yaml,
    /// The document as JSON.
    Json,
}

/// Container runtime queried for existing networks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Runtime {
    /// Docker CLI.
    #[default]
    Docker,
    /// Podman CLI.
    Podman,
}

impl Runtime {
    /// Executable name.
    #[must_use]
    pub const fn program(self) -> &'static str {
        match self {
            Self::Docker => "docker",
            Self::Podman => "podman",
        }
    }
}

/// Top-level subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Report conflicts without changing anything.
    Check(CheckArgs),

    /// Resolve conflicts and emit an override document.
    Resolve(ResolveArgs),

    /// Print the current host state as a snapshot.
    Probe(HostArgs),

    /// Print or write the default configuration.
    InitConfig {
        /// Write to this file instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Where host state comes from.
#[derive(Args, Debug, Clone)]
pub struct HostArgs {
    /// Replay a recorded host snapshot (JSON) instead of probing.
    #[arg(short, long)]
    pub snapshot: Option<PathBuf>,

    /// Container runtime to query.
    #[arg(long, value_enum, default_value_t = Runtime::Docker)]
    pub runtime: Runtime,

    /// Program used to enumerate bound sockets.
    #[arg(long, default_value = "netstat")]
    pub netstat: String,
}

/// Arguments for the check command.
#[derive(Args, Debug, Clone)]
pub struct CheckArgs {
    /// Project manifest (JSON).
    #[arg(short, long)]
    pub manifest: PathBuf,

    /// Host state source.
    #[command(flatten)]
    pub host: HostArgs,
}

/// Arguments for the resolve command.
#[derive(Args, Debug, Clone)]
pub struct ResolveArgs {
    /// Project manifest (JSON).
    #[arg(short, long)]
    pub manifest: PathBuf,

    /// Host state source.
    #[command(flatten)]
    pub host: HostArgs,

    /// Port resolution strategy (auto-increment, range-allocation, user-defined).
    #[arg(long)]
    pub strategy: Option<ResolutionStrategy>,

    /// Replacement port range, START-END.
    #[arg(long)]
    pub range: Option<PortRange>,

    /// Override document rendering.
    #[arg(long, value_enum, default_value_t = Emit::Yaml)]
    pub emit: Emit,

    /// Write the override document to this file instead of stdout.
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}
