//! PostgreSQL startup-phase protocol
//!
//! The proxy only understands the first message of a connection. Everything
//! after the SSL negotiation is relayed as opaque bytes.
//!
//! Reference: <https://www.postgresql.org/docs/current/protocol-flow.html#PROTOCOL-FLOW-SSL>

pub mod codec;
pub mod constants;
pub mod messages;

pub use codec::*;
pub use constants::*;
pub use messages::*;
