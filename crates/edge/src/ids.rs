//! # Identifier generation
//!
//! `tunnel_id`, `conn_id`, and the 6-character public-host label are all
//! opaque hex strings minted from a UUID v4, which draws from the OS CSPRNG
//! — the same "slice a fresh UUID" trick the teacher used for agent IDs in
//! `generate_agent_id`, generalized to the lengths this protocol needs.

use uuid::Uuid;

/// A 16-hex-character identifier, as used for `tunnel_id` and `conn_id`.
pub fn random_id() -> String {
    random_hex(16)
}

/// A 6-hex-character label, used as the subdomain prefix of a public host.
pub fn random_label() -> String {
    random_hex(6)
}

fn random_hex(len: usize) -> String {
    debug_assert!(len <= 32, "a single UUID only yields 32 hex characters");
    let full = Uuid::new_v4().simple().to_string();
    full[..len].to_string()
}
