//! # Tunnel edge
//!
//! The public-facing half of the reverse tunnel: agents dial in on the
//! control port, public traffic arrives on the public ports this process
//! allocates per tunnel, and a collocated HTTP terminator fronts the
//! whole thing with TLS.
//!
//! Split into a library so integration tests can drive [`ControlPlane`]
//! and [`data_plane::handle_connection`] directly against in-process
//! listeners, without needing a real terminator or a real agent.

pub mod config;
pub mod control_plane;
pub mod data_plane;
pub mod ids;
pub mod liveness;
pub mod pairing;
pub mod registry;
pub mod terminator;

pub use config::EdgeConfig;
pub use control_plane::ControlPlane;
pub use pairing::PairingTable;
pub use registry::TunnelRegistry;
pub use terminator::TerminatorClient;
