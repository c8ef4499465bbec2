//! # Control Messages
//!
//! Defines every message exchanged between the agent and the edge, either
//! over the long-lived control connection or as the single framing message
//! on a freshly dialed data connection. Messages are serialized as
//! newline-delimited JSON objects using serde's internally-tagged
//! representation (`"type": "..."` field).

use serde::{Deserialize, Serialize};

/// All possible control-plane messages.
///
/// `#[serde(tag = "type", rename_all = "snake_case")]` means each variant
/// serializes as a JSON object with a `"type"` field holding the
/// snake_case variant name, e.g. `ControlMessage::TunnelOpened { .. }`
/// becomes `{"type": "tunnel_opened", ...}`. Every field is a plain string
/// (opaque identifiers included) and missing optional fields default to
/// the empty string rather than failing to parse.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlMessage {
    /// Agent → Edge. First and only message the edge will accept on a
    /// fresh control connection.
    OpenTunnel {
        #[serde(default)]
        client_id: String,
        #[serde(default)]
        local_hint: String,
        #[serde(default)]
        domain: String,
        #[serde(default)]
        local_url: String,
    },

    /// Edge → Agent. Acknowledges a successful `open_tunnel`.
    TunnelOpened {
        #[serde(default)]
        tunnel_id: String,
        /// `host:port` the public Internet can reach this tunnel on.
        #[serde(default)]
        public_addr: String,
        #[serde(default)]
        public_host: String,
    },

    /// Edge → Agent. Sent instead of `tunnel_opened` when tunnel creation
    /// fails; the connection is closed immediately after.
    TunnelError {
        #[serde(default)]
        error: String,
    },

    /// Edge → Agent. Asks the agent to dial a fresh data connection and
    /// tag it with `conn_id` so the edge can pair it with the public
    /// connection that triggered the request.
    ConnRequest {
        #[serde(default)]
        tunnel_id: String,
        #[serde(default)]
        conn_id: String,
    },

    /// Agent → Edge. Sent as the only message on a newly dialed data
    /// connection, immediately before the connection becomes an opaque
    /// byte pipe.
    DataInit {
        #[serde(default)]
        tunnel_id: String,
        #[serde(default)]
        conn_id: String,
    },

    /// Agent → Edge. Informational keep-alive; the edge accepts and
    /// ignores it.
    Heartbeat {
        #[serde(default)]
        tunnel_id: String,
    },
}

impl ControlMessage {
    /// Name of the wire `type` discriminator, for log messages.
    pub fn kind(&self) -> &'static str {
        match self {
            ControlMessage::OpenTunnel { .. } => "open_tunnel",
            ControlMessage::TunnelOpened { .. } => "tunnel_opened",
            ControlMessage::TunnelError { .. } => "tunnel_error",
            ControlMessage::ConnRequest { .. } => "conn_request",
            ControlMessage::DataInit { .. } => "data_init",
            ControlMessage::Heartbeat { .. } => "heartbeat",
        }
    }
}
