//! # Tunnel agent
//!
//! Dials an edge's control port, asks it to open a tunnel for a local
//! service, and bridges every subsequent `conn_request` to that service.
//! Runs once: a failed handshake or connection exits with status 1 rather
//! than retrying forever, matching a one-shot CLI rather than a
//! persistent desktop client.
//!
//! ## Modules
//!
//! - [`config`]  — CLI flags and address/target derivation
//! - [`ids`]     — default `client_id` generation
//! - [`control`] — control connection handshake and `conn_request` dispatch
//! - [`bridge`]  — per-connection dial-and-pump

mod bridge;
mod config;
mod control;
mod ids;

use config::AgentConfig;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tunnel_agent=info".into()),
        )
        .init();

    let config = AgentConfig::from_env()?;

    // A user interrupt is a normal shutdown (exit 0), not a fatal error:
    // dropping the control connection here is enough, since the edge
    // reads its EOF and tears the tunnel down on its own.
    tokio::select! {
        result = control::run(config) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("received shutdown signal");
            Ok(())
        }
    }
}
