//! Server module for pg-tls-proxy
//!
//! This module contains:
//! - TCP listener (accept loop and per-connection fault boundary)
//! - Connection pipeline (negotiation, handshake, backend dial, relay)
//! - SSL negotiation
//! - Interception-aware stream adapter
//! - Duplex relay

pub mod connection;
pub mod listener;
pub mod negotiation;
pub mod relay;
pub mod stream;

use std::fmt;

pub use connection::Connection;
pub use listener::{Listener, ListenerStats};
pub use negotiation::negotiate;
pub use relay::{Relay, RelayOutcome};
pub use stream::{CloseSignal, InterceptedStream};

/// Direction of a relay copy loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Decrypted client bytes forwarded to the backend
    ClientToBackend,
    /// Backend bytes forwarded (encrypted) to the client
    BackendToClient,
}

impl Direction {
    /// The other direction
    pub fn reverse(self) -> Self {
        match self {
            Direction::ClientToBackend => Direction::BackendToClient,
            Direction::BackendToClient => Direction::ClientToBackend,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::ClientToBackend => f.write_str("client->backend"),
            Direction::BackendToClient => f.write_str("backend->client"),
        }
    }
}
