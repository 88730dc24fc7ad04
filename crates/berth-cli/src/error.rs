//! CLI error types.

use std::fmt;

use berth_core::{BerthError, ErrorKind};

/// CLI-specific errors.
#[derive(Debug)]
pub enum CliError {
    /// The engine rejected the input or failed to run.
    Engine(BerthError),
    /// Invalid configuration.
    Config(String),
    /// Output formatting error.
    Format(String),
    /// Invalid argument.
    InvalidArgument(String),
    /// IO error.
    Io(std::io::Error),
}

impl CliError {
    /// Process exit code for this error.
    ///
    /// Probe failures exit with 3 so wrappers can tell a transient host
    /// problem from bad input (2) or anything else (1).
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Engine(e) if e.kind() == ErrorKind::ProbeFailure => 3,
            Self::Engine(e) if e.kind() == ErrorKind::MalformedInput => 2,
            Self::Config(_) | Self::InvalidArgument(_) => 2,
            _ => 1,
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Engine(e) => write!(f, "{e}"),
            Self::Config(msg) => write!(f, "configuration error: {msg}"),
            Self::Format(msg) => write!(f, "format error: {msg}"),
            Self::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            Self::Io(e) => write!(f, "IO error: {e}"),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Engine(e) => Some(e),
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<BerthError> for CliError {
    fn from(err: BerthError) -> Self {
        match err {
            BerthError::Config(msg) => Self::Config(msg),
            other => Self::Engine(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_config() {
        let err = CliError::Config("port.range.start must be at least 1".into());
        assert_eq!(err.to_string(), "configuration error: port.range.start must be at least 1");
    }

    #[test]
    fn test_engine_config_error_unwrapped() {
        let err = CliError::from(BerthError::config("bad"));
        assert!(matches!(err, CliError::Config(ref m) if m == "bad"));
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(CliError::from(BerthError::probe_failed("netstat", "gone")).exit_code(), 3);
        assert_eq!(CliError::from(BerthError::malformed("port", "x", "bad")).exit_code(), 2);
        assert_eq!(CliError::from(BerthError::validation("dup")).exit_code(), 1);
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let cli_err = CliError::from(io_err);
        assert!(matches!(cli_err, CliError::Io(_)));
    }
}
