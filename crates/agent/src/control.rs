//! # Control connection
//!
//! Dials the edge's control port, performs the `open_tunnel` handshake,
//! then holds the connection open: every `conn_request` spawns a bridging
//! task, and a 30-second heartbeat lets the edge's operators see the
//! agent is still alive (the edge itself doesn't require it — spec.md
//! §4.5's keep-alive is a blocking read, not a ping/pong contract).

use crate::bridge;
use crate::config::AgentConfig;
use anyhow::{bail, Context};
use std::time::Duration;
use tokio::io::BufReader;
use tokio::net::TcpStream;
use tracing::{info, warn};
use tunnel_protocol::{read_message, write_message, ControlMessage};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Runs the agent end to end: connect, handshake, then serve
/// `conn_request`s until the edge closes the connection. Returns an error
/// for the caller to translate into a non-zero exit code; per-connection
/// bridging failures are logged and do not end the process.
pub async fn run(config: AgentConfig) -> anyhow::Result<()> {
    let stream = TcpStream::connect(&config.control_addr)
        .await
        .with_context(|| format!("failed to connect to edge at {}", config.control_addr))?;
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    write_message(
        &mut write_half,
        &ControlMessage::OpenTunnel {
            client_id: config.client_id.clone(),
            local_hint: config.local_target.clone(),
            domain: config.domain.clone(),
            local_url: format!("tcp://{}", config.local_target),
        },
    )
    .await
    .context("failed to send open_tunnel")?;

    let tunnel_id = match read_message(&mut reader)
        .await
        .context("failed to read the edge's reply to open_tunnel")?
    {
        ControlMessage::TunnelOpened {
            tunnel_id,
            public_addr,
            public_host,
        } => {
            info!(tunnel_id, public_addr, public_host, "tunnel opened");
            tunnel_id
        }
        ControlMessage::TunnelError { error } => {
            bail!("edge refused to open a tunnel: {error}");
        }
        other => {
            bail!("unexpected reply to open_tunnel: {}", other.kind());
        }
    };

    let heartbeat_tunnel_id = tunnel_id.clone();
    let heartbeat = tokio::spawn(async move {
        let mut write_half = write_half;
        let mut ticker = tokio::time::interval(HEARTBEAT_INTERVAL);
        loop {
            ticker.tick().await;
            let msg = ControlMessage::Heartbeat {
                tunnel_id: heartbeat_tunnel_id.clone(),
            };
            if write_message(&mut write_half, &msg).await.is_err() {
                return;
            }
        }
    });

    loop {
        match read_message(&mut reader).await {
            Ok(ControlMessage::ConnRequest { tunnel_id, conn_id }) => {
                let data_addr = config.data_addr.clone();
                let local_target = config.local_target.clone();
                tokio::spawn(async move {
                    bridge::handle_conn_request(data_addr, local_target, tunnel_id, conn_id).await;
                });
            }
            Ok(other) => {
                warn!(kind = other.kind(), "unexpected frame on control connection");
            }
            Err(err) => {
                info!(%err, "control connection closed");
                break;
            }
        }
    }

    heartbeat.abort();
    Ok(())
}
