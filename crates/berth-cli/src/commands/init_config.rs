//! Default configuration command implementation.

use std::io::Write;
use std::path::Path;

use berth_core::EngineConfig;
use tracing::info;

use super::write_file;
use crate::error::CliError;

/// Init-config command executor.
pub struct InitConfigCommand {
    config: EngineConfig,
}

impl InitConfigCommand {
    /// Create a command that renders `config`.
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    /// Write the configuration as TOML to `output`, or to `writer` if no
    /// path is given.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or writing fails.
    pub fn execute<W: Write>(&self, writer: &mut W, output: Option<&Path>) -> Result<(), CliError> {
        let rendered = self.config.to_toml()?;
        match output {
            Some(path) => {
                write_file(path, &rendered)?;
                info!(path = %path.display(), "configuration written");
            }
            None => writer.write_all(rendered.as_bytes())?,
        }
        Ok(())
    }
}
