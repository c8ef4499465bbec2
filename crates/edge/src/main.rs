//! # Tunnel edge binary
//!
//! Wires the library's pieces together: binds the fixed control and data
//! ports, builds the shared registry/pairing/terminator collaborators,
//! and runs both accept loops until shutdown.
//!
//! ## Architecture
//!
//! ```text
//! Internet ──TLS──► Terminator ──HTTP──► public_port ──┐
//!                                                       ├─ byte pump
//! Agent ──control:4440──► Edge ──data:4441──► data conn ┘
//! ```

use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};
use tunnel_edge::{config, ControlPlane, EdgeConfig, PairingTable, TerminatorClient, TunnelRegistry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tunnel_edge=info".into()),
        )
        .init();

    let config = Arc::new(EdgeConfig::from_env().await?);
    info!(public_ip = %config.public_ip, terminator_url = %config.terminator_url, "starting edge");

    let terminator = TerminatorClient::new(config.terminator_url.clone());
    let registry = Arc::new(TunnelRegistry::new(terminator));
    let pairing = Arc::new(PairingTable::new());

    let control_plane = ControlPlane {
        registry: registry.clone(),
        pairing: pairing.clone(),
        config: config.clone(),
    };

    let control_listener = TcpListener::bind(config::CONTROL_ADDR).await?;
    let data_listener = TcpListener::bind(config::DATA_ADDR).await?;
    info!(control = config::CONTROL_ADDR, data = config::DATA_ADDR, "listening");

    let control_task = tokio::spawn(run_control_accept_loop(control_listener, control_plane));
    let data_task = tokio::spawn(run_data_accept_loop(data_listener, pairing));

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("received shutdown signal");
        }
        result = control_task => {
            if let Err(err) = result {
                error!(%err, "control accept loop task panicked");
            }
        }
        result = data_task => {
            if let Err(err) = result {
                error!(%err, "data accept loop task panicked");
            }
        }
    }

    Ok(())
}

async fn run_control_accept_loop(listener: TcpListener, control_plane: ControlPlane) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                let control_plane = control_plane.clone();
                tokio::spawn(async move { control_plane.handle_connection(stream, peer).await });
            }
            Err(err) => {
                error!(%err, "control listener accept failed");
            }
        }
    }
}

async fn run_data_accept_loop(listener: TcpListener, pairing: Arc<PairingTable>) {
    loop {
        match listener.accept().await {
            Ok((stream, _peer)) => {
                let pairing = pairing.clone();
                tokio::spawn(
                    async move { tunnel_edge::data_plane::handle_connection(pairing, stream).await },
                );
            }
            Err(err) => {
                error!(%err, "data listener accept failed");
            }
        }
    }
}
