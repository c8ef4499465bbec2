//! # Line framing
//!
//! Every control message is a JSON object, serialized without embedded
//! newlines, terminated by a single `\n`. The receiver reads up to and
//! including the `\n`, then parses; bytes after it belong to the next
//! frame. A parse error is fatal to the connection it occurred on.
//!
//! The data listener uses this same framing for exactly one `data_init`
//! line, after which the connection is handed to the byte pump and every
//! further byte is opaque — callers must stop calling [`read_message`]
//! once that happens.

use crate::message::ControlMessage;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt};

/// Maximum line length accepted from a peer. Not spec-mandated, but a
/// misbehaving client sending an unterminated line should not be allowed
/// to grow the read buffer without bound.
pub const MAX_LINE_BYTES: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum FramingError {
    #[error("connection closed before a full line was read")]
    Eof,

    #[error("line exceeded {MAX_LINE_BYTES} bytes without a terminator")]
    LineTooLong,

    #[error("invalid json: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Reads one newline-terminated JSON frame and parses it as a
/// [`ControlMessage`]. Returns [`FramingError::Eof`] if the peer closed the
/// connection before a full line arrived.
pub async fn read_message<R>(reader: &mut R) -> Result<ControlMessage, FramingError>
where
    R: AsyncBufReadExt + Unpin,
{
    let line = read_line(reader).await?;
    Ok(serde_json::from_str(&line)?)
}

/// Reads one newline-terminated line without parsing it, for callers that
/// need the raw bytes (none in this crate today, but kept symmetrical with
/// `write_message` and useful for tests).
///
/// Reads one byte at a time rather than calling `AsyncBufReadExt::read_line`
/// directly: `read_line` keeps pulling from the underlying reader inside a
/// single `.await` until it finds `\n` or hits EOF, so a peer that streams
/// bytes without ever sending either would grow the buffer without bound
/// before our length check ever got a chance to run. Checking the length
/// after every byte keeps the bound real.
pub async fn read_line<R>(reader: &mut R) -> Result<String, FramingError>
where
    R: AsyncBufReadExt + Unpin,
{
    let mut line = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        let n = reader.read(&mut byte).await?;
        if n == 0 {
            return Err(FramingError::Eof);
        }
        line.push(byte[0]);
        if byte[0] == b'\n' {
            return Ok(String::from_utf8_lossy(&line).into_owned());
        }
        if line.len() > MAX_LINE_BYTES {
            return Err(FramingError::LineTooLong);
        }
    }
}

/// Reads one newline-terminated JSON frame directly off `reader`, one byte
/// at a time, without wrapping it in a [`tokio::io::BufReader`].
///
/// The data listener uses this instead of [`read_message`]: a `BufReader`
/// would eagerly read ahead past the `\n`, silently swallowing the first
/// bytes of whatever the byte pump was about to forward. `data_init` is
/// tiny and read exactly once per connection, so the extra syscalls are
/// not a real cost.
pub async fn read_message_unbuffered<R>(reader: &mut R) -> Result<ControlMessage, FramingError>
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut line = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        let n = reader.read(&mut byte).await?;
        if n == 0 {
            return Err(FramingError::Eof);
        }
        if byte[0] == b'\n' {
            break;
        }
        line.push(byte[0]);
        if line.len() > MAX_LINE_BYTES {
            return Err(FramingError::LineTooLong);
        }
    }
    Ok(serde_json::from_slice(&line)?)
}

/// Serializes `msg` without embedded newlines and writes it followed by a
/// single `\n`.
pub async fn write_message<W>(writer: &mut W, msg: &ControlMessage) -> Result<(), FramingError>
where
    W: AsyncWriteExt + Unpin,
{
    let mut line = serde_json::to_string(msg)?;
    line.push('\n');
    writer.write_all(line.as_bytes()).await?;
    Ok(())
}
