//! berth CLI binary entrypoint.

use std::io;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use berth_cli::cli::{Cli, Commands, LogFormat};
use berth_cli::commands::{self, CheckCommand, InitConfigCommand, ProbeCommand, ResolveCommand};
use berth_cli::output::OutputFormat;
use berth_cli::CliError;

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_tracing(cli.log_format, cli.verbose) {
        eprintln!("Failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(e.exit_code())
        }
    }
}

fn init_tracing(format: LogFormat, verbose: bool) -> anyhow::Result<()> {
    let level = if verbose { "berth=debug" } else { "berth=info" };
    let filter = EnvFilter::from_default_env().add_directive(level.parse()?);

    match format {
        LogFormat::Text => tracing_subscriber::registry()
            .with(fmt::layer().with_writer(io::stderr))
            .with(filter)
            .try_init()?,
        LogFormat::Json => tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(io::stderr))
            .with(filter)
            .try_init()?,
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let format = OutputFormat::new(cli.format);
    let config = commands::load_config(cli.config.as_deref())?;
    let mut stdout = io::stdout().lock();

    match cli.command {
        Commands::Check(args) => {
            let cmd = CheckCommand::new(config);
            cmd.execute(&mut stdout, &format, &args).await?;
        }
        Commands::Resolve(args) => {
            let cmd = ResolveCommand::new(config);
            cmd.execute(&mut stdout, &format, &args).await?;
        }
        Commands::Probe(args) => {
            let cmd = ProbeCommand::new(config);
            cmd.execute(&mut stdout, &format, &args).await?;
        }
        Commands::InitConfig { output } => {
            let cmd = InitConfigCommand::new(config);
            cmd.execute(&mut stdout, output.as_deref())?;
        }
    }

    Ok(())
}
