//! # Tunnel registry
//!
//! Holds the two mappings from spec.md §4.3 (`tunnel_id → Tunnel`,
//! `public_port → tunnel_id`) behind a single async reader/writer lock, so
//! that `create_tunnel` can hold the lock across the terminator's HTTP call
//! and stay atomic: either a tunnel is fully registered (listener bound,
//! terminator route installed, both maps updated) or none of it happened.
//!
//! `Tunnel` never back-references its control connection (spec.md §9's "no
//! cyclic references" note) — the write half used to send `conn_request`
//! frames lives only in the registry's internal entry, looked up by
//! `tunnel_id`.

use crate::ids::{random_id, random_label};
use crate::terminator::{TerminatorClient, TerminatorError};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpListener;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tunnel_protocol::{write_message, ControlMessage};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("failed to allocate a public port: {0}")]
    PortAllocation(std::io::Error),

    #[error("terminator rejected the route: {0}")]
    Terminator(#[from] TerminatorError),
}

/// Public-facing tunnel attributes, handed back once a tunnel is created.
#[derive(Debug, Clone)]
pub struct Tunnel {
    pub tunnel_id: String,
    pub client_id: String,
    pub domain: String,
    pub public_host: String,
    pub public_port: u16,
}

struct Entry {
    tunnel: Tunnel,
    ctl_write: Arc<Mutex<OwnedWriteHalf>>,
    listener: Option<TcpListener>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

struct Inner {
    tunnels: HashMap<String, Entry>,
    ports: HashMap<u16, String>,
}

/// Shared tunnel registry. Callers hold it behind an `Arc`.
pub struct TunnelRegistry {
    inner: RwLock<Inner>,
    terminator: TerminatorClient,
}

impl TunnelRegistry {
    pub fn new(terminator: TerminatorClient) -> Self {
        Self {
            inner: RwLock::new(Inner {
                tunnels: HashMap::new(),
                ports: HashMap::new(),
            }),
            terminator,
        }
    }

    /// Creates a tunnel: strips a leading `*.` from `domain`, allocates a
    /// port, adds the terminator route, and stores the entry — all under
    /// one write-lock acquisition. On failure the port/listener is
    /// released and no state is left behind.
    pub async fn create_tunnel(
        &self,
        client_id: String,
        domain: String,
        public_port_override: Option<u16>,
        ctl_write: OwnedWriteHalf,
    ) -> Result<Tunnel, RegistryError> {
        let domain = domain.strip_prefix("*.").unwrap_or(&domain).to_string();
        let label = random_label();
        let public_host = format!("{label}.{domain}");

        let mut guard = self.inner.write().await;

        let (public_port, listener) = allocate_port(public_port_override)
            .await
            .map_err(RegistryError::PortAllocation)?;

        if let Err(err) = self.terminator.add_route(&public_host, public_port).await {
            drop(listener);
            return Err(RegistryError::Terminator(err));
        }

        let tunnel_id = random_id();
        let tunnel = Tunnel {
            tunnel_id: tunnel_id.clone(),
            client_id,
            domain,
            public_host,
            public_port,
        };

        guard.tunnels.insert(
            tunnel_id.clone(),
            Entry {
                tunnel: tunnel.clone(),
                ctl_write: Arc::new(Mutex::new(ctl_write)),
                listener: Some(listener),
                tasks: Mutex::new(Vec::new()),
            },
        );
        guard.ports.insert(public_port, tunnel_id.clone());

        info!(tunnel_id, public_host = %tunnel.public_host, public_port, "tunnel created");
        Ok(tunnel)
    }

    /// Takes the bound listener out of the entry so the caller can spawn
    /// the public accept loop. Returns `None` if called twice, or after
    /// the tunnel has already been closed.
    pub async fn take_listener(&self, tunnel_id: &str) -> Option<TcpListener> {
        let mut guard = self.inner.write().await;
        guard.tunnels.get_mut(tunnel_id)?.listener.take()
    }

    /// Registers a background task (public accept loop, prober) so it gets
    /// aborted wholesale on cleanup. Aborts `handle` immediately if the
    /// tunnel is already gone.
    pub async fn track_task(&self, tunnel_id: &str, handle: JoinHandle<()>) {
        let guard = self.inner.read().await;
        match guard.tunnels.get(tunnel_id) {
            Some(entry) => entry.tasks.lock().await.push(handle),
            None => handle.abort(),
        }
    }

    /// Writes any control frame to the tunnel's control connection —
    /// `tunnel_opened` right after creation, `conn_request` for every
    /// bridged public connection.
    pub async fn send_message(&self, tunnel_id: &str, msg: &ControlMessage) -> std::io::Result<()> {
        let ctl_write = {
            let guard = self.inner.read().await;
            match guard.tunnels.get(tunnel_id) {
                Some(entry) => entry.ctl_write.clone(),
                None => {
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::NotFound,
                        "tunnel not found",
                    ))
                }
            }
        };
        let mut write = ctl_write.lock().await;
        write_message(&mut *write, msg)
            .await
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))
    }

    /// Returns a copy of the tunnel's public attributes, if it's still live.
    pub async fn get(&self, tunnel_id: &str) -> Option<Tunnel> {
        self.inner
            .read()
            .await
            .tunnels
            .get(tunnel_id)
            .map(|e| e.tunnel.clone())
    }

    /// Tears a tunnel down: closes its listener, removes the terminator
    /// route, shuts down its control connection, and only then aborts its
    /// background tasks. Safe to call twice — the second call is a no-op.
    ///
    /// The abort loop must run *last*. The liveness prober is itself one of
    /// the tracked tasks, and it calls `close_tunnel` from inside its own
    /// task when a probe judges the tunnel dead — aborting tasks before the
    /// terminator call would mark that very task cancelled, and the next
    /// `.await` (the route-delete request) would then drop it mid-flight,
    /// leaving the route and the control connection behind.
    pub async fn close_tunnel(&self, tunnel_id: &str) {
        let entry = {
            let mut guard = self.inner.write().await;
            let Some(entry) = guard.tunnels.remove(tunnel_id) else {
                return;
            };
            guard.ports.remove(&entry.tunnel.public_port);
            entry
        };

        drop(entry.listener);

        if let Err(err) = self
            .terminator
            .delete_route_by_host(&entry.tunnel.public_host)
            .await
        {
            warn!(tunnel_id, %err, "terminator route delete failed during teardown");
        }

        let mut write = entry.ctl_write.lock().await;
        let _ = write.shutdown().await;
        drop(write);

        for handle in entry.tasks.into_inner().drain(..) {
            handle.abort();
        }

        info!(tunnel_id, "tunnel closed");
    }
}

async fn allocate_port(public_port_override: Option<u16>) -> std::io::Result<(u16, TcpListener)> {
    if let Some(port) = public_port_override {
        let listener = TcpListener::bind(("0.0.0.0", port)).await?;
        return Ok((port, listener));
    }
    let listener = TcpListener::bind(("0.0.0.0", 0)).await?;
    let port = listener.local_addr()?.port();
    Ok((port, listener))
}
