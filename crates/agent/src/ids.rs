//! # Identifier generation
//!
//! `client_id` defaults to a 16-hex-character string minted from a UUID
//! v4 when `--id` isn't given, the same "slice a fresh UUID" trick the
//! edge crate uses for `tunnel_id`/`conn_id`.

use uuid::Uuid;

pub fn random_id() -> String {
    Uuid::new_v4().simple().to_string()[..16].to_string()
}
