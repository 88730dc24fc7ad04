//! Resolve command implementation.

use std::io::Write;

use berth_core::{EngineConfig, HostSnapshot, Manifest, RunReport};
use tracing::info;

use super::{host_snapshot, load_manifest, replay_engine, write_file};
use crate::cli::{Emit, ResolveArgs};
use crate::error::CliError;
use crate::output::OutputFormat;

/// Resolve command executor.
pub struct ResolveCommand {
    config: EngineConfig,
}

impl ResolveCommand {
    /// Create a new resolve command.
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    /// Execute the resolve command.
    ///
    /// Without `--output` the override document goes to `writer`. With it,
    /// the document is written to the file and the run summary goes to
    /// `writer` instead.
    ///
    /// # Errors
    ///
    /// Returns an error on invalid input, probe failure, validation failure
    /// or output failure.
    pub async fn execute<W: Write>(
        &self,
        writer: &mut W,
        format: &OutputFormat,
        args: &ResolveArgs,
    ) -> Result<(), CliError> {
        let config = self.effective_config(args)?;
        let manifest = load_manifest(&args.manifest)?;
        let snapshot = host_snapshot(&args.host, &config).await?;
        let report = Self::resolve(config, &manifest, &snapshot).await?;
        let rendered = render(&report, args.emit)?;

        match &args.output {
            Some(path) => {
                write_file(path, &rendered)?;
                info!(path = %path.display(), "override written");
                format.write(writer, &report)?;
            }
            None => writer.write_all(rendered.as_bytes())?,
        }
        Ok(())
    }

    /// Apply `--strategy` and `--range` on top of the loaded configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the result fails validation.
    pub fn effective_config(&self, args: &ResolveArgs) -> Result<EngineConfig, CliError> {
        let mut config = self.config.clone();
        if let Some(strategy) = args.strategy {
            config.strategy = strategy;
        }
        if let Some(range) = args.range {
            config.port.range = range;
        }
        config.validate()?;
        Ok(config)
    }

    /// Run the engine against a fixed snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine run fails.
    pub async fn resolve(
        config: EngineConfig,
        manifest: &Manifest,
        snapshot: &HostSnapshot,
    ) -> Result<RunReport, CliError> {
        Ok(replay_engine(snapshot, config).run(manifest).await?)
    }
}

fn render(report: &RunReport, emit: Emit) -> Result<String, CliError> {
    match emit {
        Emit::Yaml => Ok(report.document.to_compose_yaml()),
        Emit::Json => serde_json::to_string_pretty(&report.document)
            .map(|mut s| {
                s.push('\n');
                s
            })
            .map_err(|e| CliError::Format(format!("JSON serialization failed: {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    use berth_core::{PortBinding, PortRange, ResolutionStrategy, Service};

    use crate::cli::{HostArgs, Runtime};

    fn args() -> ResolveArgs {
        ResolveArgs {
            manifest: PathBuf::from("app.json"),
            host: HostArgs {
                snapshot: None,
                runtime: Runtime::Docker,
                netstat: "netstat".into(),
            },
            strategy: None,
            range: None,
            emit: Emit::Yaml,
            output: None,
        }
    }

    #[test]
    fn test_flags_override_config() {
        let mut args = args();
        args.strategy = Some(ResolutionStrategy::RangeAllocation);
        args.range = Some(PortRange::new(20000, 20999));

        let config = ResolveCommand::new(EngineConfig::default())
            .effective_config(&args)
            .expect("config");
        assert_eq!(config.strategy, ResolutionStrategy::RangeAllocation);
        assert_eq!(config.port.range, PortRange::new(20000, 20999));
    }

    #[test]
    fn test_inverted_range_rejected() {
        let mut args = args();
        args.range = Some(PortRange::new(9000, 8000));
        let err = ResolveCommand::new(EngineConfig::default())
            .effective_config(&args)
            .expect_err("inverted");
        assert!(matches!(err, CliError::Config(_)));
    }

    #[tokio::test]
    async fn test_resolve_renders_override() {
        let manifest =
            Manifest::new("shop").with_service(Service::new("web").with_binding(PortBinding::new(3000, 3000)));
        let snapshot = HostSnapshot::new([3000], Vec::new());
        let report = ResolveCommand::resolve(EngineConfig::default(), &manifest, &snapshot)
            .await
            .expect("resolve");

        let yaml = render(&report, Emit::Yaml).expect("yaml");
        assert!(yaml.contains("\"8000:3000\""));

        let json: serde_json::Value =
            serde_json::from_str(&render(&report, Emit::Json).expect("json")).expect("decode");
        assert_eq!(json["services"]["web"]["ports"][0], "8000:3000");
    }
}
