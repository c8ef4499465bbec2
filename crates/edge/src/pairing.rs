//! # Pairing table
//!
//! Rendezvous point between the public accept loop and the data listener:
//! the public side registers a `oneshot::Sender<TcpStream>` under a fresh
//! `conn_id`, the data side looks up that `conn_id` from a `data_init`
//! frame and delivers the connection through it. Deliberately a separate
//! lock from the tunnel registry (spec.md §5) — pairing churns on every
//! public connection, and must not contend with tunnel create/close.

use dashmap::DashMap;
use tokio::net::TcpStream;
use tokio::sync::oneshot;

/// Maps a pending `conn_id` to the sender half of its rendezvous channel.
pub struct PairingTable {
    pending: DashMap<String, oneshot::Sender<TcpStream>>,
}

impl PairingTable {
    pub fn new() -> Self {
        Self {
            pending: DashMap::new(),
        }
    }

    /// Registers `conn_id`, returning the receiver half the caller should
    /// await (with its own timeout) for the matching data connection.
    pub fn register(&self, conn_id: String) -> oneshot::Receiver<TcpStream> {
        let (tx, rx) = oneshot::channel();
        self.pending.insert(conn_id, tx);
        rx
    }

    /// Delivers `stream` to the waiter registered under `conn_id`, if any.
    /// Returns `false` if there was no waiter (unknown or already-delivered
    /// `conn_id`), in which case the caller should close `stream` itself.
    pub fn deliver(&self, conn_id: &str, stream: TcpStream) -> bool {
        match self.pending.remove(conn_id) {
            Some((_, tx)) => tx.send(stream).is_ok(),
            None => false,
        }
    }

    /// Removes a waiter without delivering anything, e.g. after the
    /// pairing timeout expires. Idempotent.
    pub fn cancel(&self, conn_id: &str) {
        self.pending.remove(conn_id);
    }
}

impl Default for PairingTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn sample_stream() -> TcpStream {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connect = TcpStream::connect(addr);
        let (accepted, connected) = tokio::join!(listener.accept(), connect);
        drop(accepted);
        connected.unwrap()
    }

    #[tokio::test]
    async fn register_then_deliver_wakes_the_waiter() {
        let table = PairingTable::new();
        let rx = table.register("c1".to_string());
        let stream = sample_stream().await;
        assert!(table.deliver("c1", stream));
        rx.await.expect("receiver should get the delivered stream");
    }

    #[tokio::test]
    async fn deliver_on_unknown_conn_id_returns_false() {
        let table = PairingTable::new();
        let stream = sample_stream().await;
        assert!(!table.deliver("missing", stream));
    }

    #[tokio::test]
    async fn cancel_removes_a_pending_waiter() {
        let table = PairingTable::new();
        let _rx = table.register("c1".to_string());
        table.cancel("c1");
        let stream = sample_stream().await;
        assert!(!table.deliver("c1", stream));
    }

    #[tokio::test]
    async fn double_cancel_is_a_no_op() {
        let table = PairingTable::new();
        table.cancel("never-registered");
        table.cancel("never-registered");
    }
}
