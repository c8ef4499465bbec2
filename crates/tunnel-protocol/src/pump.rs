//! # Byte pump
//!
//! Once a public connection and a data connection are paired, every
//! further byte is opaque: the pump just copies bytes in both directions
//! until both sides have finished. Teardown is symmetric — each direction
//! shuts down its destination's write half when its source hits EOF or
//! errors, and the pump itself returns only once both directions are done.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

/// Size of the read buffer used by each direction of the pump.
const BUF_SIZE: usize = 32 * 1024;

/// Copies bytes between `a` and `b` until both directions have finished.
///
/// A read error or clean EOF on one side ends that direction only; the
/// pump still waits for the other direction before returning. A short
/// write (fewer bytes written than read) is treated as an error, aborting
/// that direction immediately.
pub async fn byte_pump(a: TcpStream, b: TcpStream) {
    let (a_read, a_write) = a.into_split();
    let (b_read, b_write) = b.into_split();

    let a_to_b = tokio::spawn(copy_direction(a_read, b_write));
    let b_to_a = tokio::spawn(copy_direction(b_read, a_write));

    let _ = tokio::join!(a_to_b, b_to_a);
}

async fn copy_direction(
    mut src: tokio::net::tcp::OwnedReadHalf,
    mut dst: tokio::net::tcp::OwnedWriteHalf,
) {
    let mut buf = vec![0u8; BUF_SIZE];
    loop {
        let n = match src.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                debug!(%e, "byte pump source read error");
                break;
            }
        };
        if let Err(e) = dst.write_all(&buf[..n]).await {
            debug!(%e, "byte pump destination write error");
            break;
        }
    }
    let _ = dst.shutdown().await;
}
