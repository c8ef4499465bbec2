//! # Edge configuration
//!
//! Read once at startup from CLI flags and environment variables into a
//! single record, then handed around by `Arc` — per spec.md §9, environment
//! reads must not be sprinkled across the request path.

use clap::Parser;
use std::time::Duration;

/// Fixed agent-facing control port. Not configurable in the default build.
pub const CONTROL_ADDR: &str = "0.0.0.0:4440";
/// Fixed agent-facing data port. Not configurable in the default build.
pub const DATA_ADDR: &str = "0.0.0.0:4441";
/// Default terminator admin API base URL.
const DEFAULT_TERMINATOR_URL: &str = "http://127.0.0.1:2019";
/// Default wildcard domain substituted when `open_tunnel.domain` is empty.
const DEFAULT_DOMAIN: &str = "apps.example.com";

/// How long the bridging procedure waits for a data connection before
/// giving up on a public connection (spec.md §4.5).
pub const PAIRING_TIMEOUT: Duration = Duration::from_secs(10);
/// How often the liveness prober probes a tunnel's public host.
pub const PROBE_INTERVAL: Duration = Duration::from_secs(120);
/// Timeout for a single liveness probe request.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Parser)]
#[command(name = "tunnel-edge", about = "Reverse tunnel edge / control plane")]
struct Cli {
    /// Public IP or hostname advertised for tunnels. Auto-detected via
    /// api.ipify.org when omitted.
    #[arg(long = "public")]
    public: Option<String>,

    /// Disable the periodic liveness prober for every tunnel.
    #[arg(long = "disable-health-check")]
    disable_health_check: bool,

    /// Base URL of the collocated HTTP terminator's admin API.
    #[arg(long = "terminator-url", env = "TERMINATOR_URL")]
    terminator_url: Option<String>,
}

/// Process-wide configuration, built once in `main`.
#[derive(Debug, Clone)]
pub struct EdgeConfig {
    pub public_ip: String,
    pub disable_health_check: bool,
    pub terminator_url: String,
    pub default_domain: String,
    /// Forces the public listener to this exact port; fails if busy.
    /// Read from `PUBLIC_PORT` once at startup.
    pub public_port_override: Option<u16>,
}

impl EdgeConfig {
    /// Parses CLI flags and environment variables, detecting the public IP
    /// if `-public` was not given. Fails the process (matching the Go
    /// source's `os.Exit(1)`) if no public IP can be determined.
    pub async fn from_env() -> anyhow::Result<Self> {
        let cli = Cli::parse();

        let public_ip = match cli.public {
            Some(ip) if !ip.is_empty() => ip,
            _ => detect_public_ip()
                .await
                .ok_or_else(|| anyhow::anyhow!(
                    "could not detect public IP, please provide it with --public"
                ))?,
        };

        let disable_health_check =
            cli.disable_health_check || std::env::var_os("DISABLE_HEALTH_CHECK").is_some();

        let terminator_url = cli
            .terminator_url
            .unwrap_or_else(|| DEFAULT_TERMINATOR_URL.to_string());

        let public_port_override = std::env::var("PUBLIC_PORT")
            .ok()
            .and_then(|v| v.parse::<u16>().ok());

        Ok(Self {
            public_ip,
            disable_health_check,
            terminator_url,
            default_domain: DEFAULT_DOMAIN.to_string(),
            public_port_override,
        })
    }
}

async fn detect_public_ip() -> Option<String> {
    let resp = reqwest::get("https://api.ipify.org").await.ok()?;
    let body = resp.text().await.ok()?;
    let ip = body.trim();
    if ip.is_empty() {
        None
    } else {
        Some(ip.to_string())
    }
}
