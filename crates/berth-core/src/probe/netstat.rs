//! Bound-port enumeration via `netstat -an`.
//!
//! Both the BSD/macOS layout (`*.8080`, `127.0.0.1.5432`) and the Linux
//! net-tools layout (`0.0.0.0:22`, `:::80`) are understood. TCP sockets
//! count only in the `LISTEN` state; UDP sockets count when bound with a
//! wildcard foreign address.

use std::collections::BTreeSet;
use std::process::Stdio;

use once_cell::sync::Lazy;
use regex::Regex;
use tokio::process::Command;
use tracing::debug;

use super::HostPortProbe;
use crate::error::{BerthError, Result};

/// `proto recv-q send-q local foreign [state]`
static SOCKET_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(tcp|udp)\S*\s+\d+\s+\d+\s+(\S+)\s+(\S+)(?:\s+(\S+))?")
        .unwrap_or_else(|_| unreachable!("socket line pattern is valid"))
});

/// Extract the port of a local address in either `host:port` or `host.port`
/// form.
fn local_port(address: &str) -> Option<u16> {
    let idx = address.rfind([':', '.'])?;
    let port = &address[idx + 1..];
    if port.is_empty() || !port.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    port.parse().ok().filter(|p| *p != 0)
}

/// Parse `netstat -an` output into the set of listening/bound ports.
#[must_use]
pub fn parse_netstat_output(output: &str) -> BTreeSet<u16> {
    let mut ports = BTreeSet::new();
    for line in output.lines() {
        let Some(caps) = SOCKET_LINE.captures(line.trim_start()) else {
            continue;
        };
        let counted = match &caps[1] {
            "tcp" => caps.get(4).is_some_and(|state| state.as_str() == "LISTEN"),
            _ => caps[3].ends_with('*'),
        };
        if !counted {
            continue;
        }
        if let Some(port) = local_port(&caps[2]) {
            ports.insert(port);
        }
    }
    ports
}

/// [`HostPortProbe`] backed by the `netstat` command.
#[derive(Debug, Clone)]
pub struct NetstatProbe {
    program: String,
}

impl NetstatProbe {
    /// Create a probe running `netstat` from `PATH`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_program("netstat")
    }

    /// Create a probe running a specific executable.
    #[must_use]
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// The executable this probe runs.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }
}

impl Default for NetstatProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl HostPortProbe for NetstatProbe {
    fn name(&self) -> &str {
        "netstat"
    }

    async fn detect_used_ports(&self) -> Result<BTreeSet<u16>> {
        let output = Command::new(&self.program)
            .arg("-an")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                BerthError::probe_failed("netstat", format!("failed to run {}: {e}", self.program))
            })?;

        if !output.status.success() {
            return Err(BerthError::CommandFailed {
                command: format!("{} -an", self.program),
                exit_code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let ports = parse_netstat_output(&String::from_utf8_lossy(&output.stdout));
        debug!(count = ports.len(), "detected bound host ports");
        Ok(ports)
    }
}
