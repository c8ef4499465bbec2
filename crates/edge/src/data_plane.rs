//! # Data plane
//!
//! The data listener accepts one connection per bridged public
//! connection. Each one starts with a single `data_init` frame naming the
//! `conn_id` it's answering; everything after that is opaque bytes owned
//! by the byte pump (spec.md §4.6).

use crate::pairing::PairingTable;
use std::sync::Arc;
use tokio::net::TcpStream;
use tracing::{debug, warn};
use tunnel_protocol::{read_message_unbuffered, ControlMessage};

/// Reads the `data_init` frame off `stream` and hands it to the waiter
/// registered under its `conn_id`. A stale or unknown `conn_id` (the
/// pairing timeout already fired, or the agent sent garbage) just closes
/// the connection — it's not a control-plane error.
///
/// Uses [`read_message_unbuffered`] rather than wrapping `stream` in a
/// `BufReader`: a `BufReader` would read ahead past the `data_init` line
/// and swallow the first bytes the byte pump was meant to forward.
pub async fn handle_connection(pairing: Arc<PairingTable>, mut stream: TcpStream) {
    let conn_id = match read_message_unbuffered(&mut stream).await {
        Ok(ControlMessage::DataInit { conn_id, .. }) => conn_id,
        Ok(other) => {
            warn!(kind = other.kind(), "expected data_init as the first frame");
            return;
        }
        Err(err) => {
            debug!(%err, "failed to read data_init");
            return;
        }
    };

    if !pairing.deliver(&conn_id, stream) {
        debug!(conn_id, "data connection arrived for an unknown or expired conn_id");
    }
}
