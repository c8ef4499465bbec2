//! # Bridging
//!
//! For every `conn_request` the edge sends, dial a fresh data connection
//! and the local target in parallel, announce the data connection with
//! `data_init`, then hand both streams to the byte pump. A failure to
//! dial either side tears down whichever connection did succeed.

use tokio::net::TcpStream;
use tracing::warn;
use tunnel_protocol::{write_message, ControlMessage};

/// Handles one `conn_request`. Runs until the bridged connection closes.
pub async fn handle_conn_request(
    data_addr: String,
    local_target: String,
    tunnel_id: String,
    conn_id: String,
) {
    let dial_data = TcpStream::connect(&data_addr);
    let dial_local = TcpStream::connect(&local_target);

    let (data_stream, local_stream) = match tokio::try_join!(dial_data, dial_local) {
        Ok(pair) => pair,
        Err(err) => {
            warn!(tunnel_id, conn_id, %err, "failed to dial data connection or local target");
            return;
        }
    };

    let mut data_stream = data_stream;
    if let Err(err) = write_message(
        &mut data_stream,
        &ControlMessage::DataInit { tunnel_id, conn_id },
    )
    .await
    {
        warn!(%err, "failed to send data_init");
        return;
    }

    tunnel_protocol::byte_pump(data_stream, local_stream).await;
}
