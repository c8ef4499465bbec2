//! # Tunnel wire protocol
//!
//! Shared between `tunnel-edge` and `tunnel-agent`: the [`ControlMessage`]
//! wire format, newline-delimited JSON framing, and the bidirectional byte
//! pump used once a public connection and a data connection are paired.

mod framing;
mod message;
mod pump;

pub use framing::{
    read_line, read_message, read_message_unbuffered, write_message, FramingError, MAX_LINE_BYTES,
};
pub use message::ControlMessage;
pub use pump::byte_pump;
