//! # Control plane
//!
//! Handles one agent's control connection end to end (spec.md §4.5):
//! reads its `open_tunnel` handshake, creates the tunnel, replies with
//! `tunnel_opened`, then spawns the public accept loop and liveness
//! prober before settling into a read loop whose only job is noticing
//! when the agent goes away.

use crate::config::{EdgeConfig, PAIRING_TIMEOUT};
use crate::ids::random_id;
use crate::liveness;
use crate::pairing::PairingTable;
use crate::registry::TunnelRegistry;
use std::sync::Arc;
use tokio::io::BufReader;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tracing::{info, warn};
use tunnel_protocol::{read_message, ControlMessage};

/// Owns the long-lived collaborators a control connection needs.
#[derive(Clone)]
pub struct ControlPlane {
    pub registry: Arc<TunnelRegistry>,
    pub pairing: Arc<PairingTable>,
    pub config: Arc<EdgeConfig>,
}

impl ControlPlane {
    /// Drives a single accepted control connection until the agent
    /// disconnects or the handshake fails.
    pub async fn handle_connection(self, stream: TcpStream, peer: std::net::SocketAddr) {
        let (read_half, write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);

        let (client_id, domain) = match read_message(&mut reader).await {
            Ok(ControlMessage::OpenTunnel {
                client_id,
                domain,
                local_hint: _,
                local_url: _,
            }) => (client_id, domain),
            Ok(other) => {
                warn!(?peer, kind = other.kind(), "expected open_tunnel as the first frame");
                return;
            }
            Err(err) => {
                warn!(?peer, %err, "failed to read the open_tunnel handshake");
                return;
            }
        };

        let domain = if domain.is_empty() {
            self.config.default_domain.clone()
        } else {
            domain
        };

        let tunnel = match self
            .registry
            .create_tunnel(
                client_id.clone(),
                domain,
                self.config.public_port_override,
                write_half,
            )
            .await
        {
            Ok(tunnel) => tunnel,
            Err(err) => {
                warn!(?peer, %err, "failed to create tunnel, agent sees the connection close");
                return;
            }
        };

        let tunnel_id = tunnel.tunnel_id.clone();
        info!(tunnel_id, client_id, public_host = %tunnel.public_host, "control connection established");

        let opened = ControlMessage::TunnelOpened {
            tunnel_id: tunnel_id.clone(),
            public_addr: format!("{}:{}", self.config.public_ip, tunnel.public_port),
            public_host: tunnel.public_host.clone(),
        };
        if self.registry.send_message(&tunnel_id, &opened).await.is_err() {
            self.registry.close_tunnel(&tunnel_id).await;
            return;
        }

        let Some(listener) = self.registry.take_listener(&tunnel_id).await else {
            self.registry.close_tunnel(&tunnel_id).await;
            return;
        };

        let accept_task = {
            let this = self.clone();
            let tid = tunnel_id.clone();
            tokio::spawn(async move { this.run_public_accept_loop(tid, listener).await })
        };
        self.registry.track_task(&tunnel_id, accept_task).await;

        if !self.config.disable_health_check {
            let prober_task = tokio::spawn(liveness::run(
                self.registry.clone(),
                tunnel_id.clone(),
                tunnel.public_host.clone(),
            ));
            self.registry.track_task(&tunnel_id, prober_task).await;
        }

        // Block here until the agent closes the control connection, or
        // sends a frame we don't expect (both are fatal to the tunnel).
        loop {
            match read_message(&mut reader).await {
                Ok(ControlMessage::Heartbeat { .. }) => continue,
                Ok(other) => {
                    warn!(tunnel_id, kind = other.kind(), "unexpected frame on control connection");
                    break;
                }
                Err(_) => break,
            }
        }

        info!(tunnel_id, "control connection closed, tearing down tunnel");
        self.registry.close_tunnel(&tunnel_id).await;
    }

    async fn run_public_accept_loop(self, tunnel_id: String, listener: TcpListener) {
        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(pair) => pair,
                Err(err) => {
                    warn!(tunnel_id, %err, "public accept loop stopped");
                    return;
                }
            };
            let this = self.clone();
            let tid = tunnel_id.clone();
            tokio::spawn(async move { this.bridge_public_connection(tid, stream, peer).await });
        }
    }

    /// Implements the bridging procedure (spec.md §4.5): mint a
    /// `conn_id`, register a pairing waiter, ask the agent for a data
    /// connection, then hand both streams to the byte pump once paired.
    async fn bridge_public_connection(
        self,
        tunnel_id: String,
        public_stream: TcpStream,
        peer: std::net::SocketAddr,
    ) {
        let conn_id = random_id();
        let rx = self.pairing.register(conn_id.clone());

        let request = ControlMessage::ConnRequest {
            tunnel_id: tunnel_id.clone(),
            conn_id: conn_id.clone(),
        };
        if self
            .registry
            .send_message(&tunnel_id, &request)
            .await
            .is_err()
        {
            self.pairing.cancel(&conn_id);
            return;
        }

        match timeout(PAIRING_TIMEOUT, rx).await {
            Ok(Ok(data_stream)) => {
                tunnel_protocol::byte_pump(public_stream, data_stream).await;
            }
            Ok(Err(_)) | Err(_) => {
                self.pairing.cancel(&conn_id);
                warn!(tunnel_id, conn_id, ?peer, "no data connection arrived in time");
            }
        }
    }
}
