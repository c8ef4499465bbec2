//! # Agent configuration
//!
//! Parsed once at startup from CLI flags: which edge to dial, which local
//! service to expose, and what identity/domain to ask for. No environment
//! reads beyond what `clap`'s `env` attribute already wires up.

use anyhow::{bail, Result};
use clap::Parser;

/// Fixed control-plane port on the edge.
const CONTROL_PORT: u16 = 4440;
/// Fixed data-plane port on the edge.
const DATA_PORT: u16 = 4441;

#[derive(Debug, Parser)]
#[command(name = "tunnel-agent", about = "Reverse tunnel agent")]
struct Cli {
    /// Edge host to dial, e.g. "edge.example.com" or "203.0.113.10".
    #[arg(long = "server", env = "TUNNEL_SERVER")]
    server: String,

    /// Edge's data-plane address (host:port). Derived from `--server`'s
    /// host and the fixed data port when omitted.
    #[arg(long = "data")]
    data: Option<String>,

    /// Local service to expose. Either a bare port (assumed on localhost)
    /// or an explicit "host:port". May also be given positionally.
    #[arg(long = "local")]
    local: Option<String>,

    /// Local service to expose, given positionally instead of via
    /// `--local` (e.g. `tunnel-agent --server x 3000`).
    #[arg(value_name = "LOCAL")]
    local_positional: Option<String>,

    /// Stable identifier for this agent, sent as `open_tunnel.client_id`.
    /// Defaults to a freshly generated id if omitted.
    #[arg(long = "id")]
    id: Option<String>,

    /// Wildcard domain to request the public host under. Empty lets the
    /// edge substitute its own default.
    #[arg(long = "domain", default_value = "")]
    domain: String,
}

/// Process-wide configuration, built once in `main`.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub control_addr: String,
    pub data_addr: String,
    pub client_id: String,
    pub domain: String,
    pub local_target: String,
}

impl AgentConfig {
    pub fn from_env() -> Result<Self> {
        let cli = Cli::parse();
        let host = strip_port(&cli.server);

        let local = match cli.local.or(cli.local_positional) {
            Some(local) => local,
            None => bail!(
                "usage: tunnel-agent --server <host> <localPort|host:port> [flags]. \
                 Example: tunnel-agent --server edge.example.com -domain '*.apps.example.com' 3000"
            ),
        };

        let data_addr = match cli.data {
            Some(data) => data,
            None => format!("{host}:{DATA_PORT}"),
        };

        Ok(Self {
            control_addr: format!("{host}:{CONTROL_PORT}"),
            data_addr,
            client_id: cli.id.unwrap_or_else(|| crate::ids::random_id()),
            domain: cli.domain,
            local_target: parse_local_target(&local),
        })
    }
}

/// Drops a trailing `:port` from a `--server` value so passing either
/// "edge.example.com" or "edge.example.com:4440" works the same way.
fn strip_port(server: &str) -> &str {
    match server.rsplit_once(':') {
        Some((host, port)) if port.chars().all(|c| c.is_ascii_digit()) => host,
        _ => server,
    }
}

/// A bare port number means "localhost"; anything else passes through
/// unchanged as a `host:port` pair.
fn parse_local_target(local: &str) -> String {
    if local.chars().all(|c| c.is_ascii_digit()) {
        format!("localhost:{local}")
    } else {
        local.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_port_removes_a_trailing_numeric_port() {
        assert_eq!(strip_port("edge.example.com:4440"), "edge.example.com");
    }

    #[test]
    fn strip_port_leaves_a_bare_host_alone() {
        assert_eq!(strip_port("edge.example.com"), "edge.example.com");
    }

    #[test]
    fn parse_local_target_expands_a_bare_port() {
        assert_eq!(parse_local_target("3000"), "localhost:3000");
    }

    #[test]
    fn parse_local_target_passes_through_an_explicit_host() {
        assert_eq!(parse_local_target("127.0.0.1:3000"), "127.0.0.1:3000");
    }
}
