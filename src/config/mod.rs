//! Configuration module for pg-tls-proxy
//!
//! ```yaml
//! server:
//!   listen_address: "0.0.0.0"
//!   listen_port: 5433
//!   tls:
//!     cert_path: "/etc/pg-tls-proxy/server.crt"
//!     key_path: "/etc/pg-tls-proxy/server.key"
//!     ca_path: "/etc/pg-tls-proxy/ca.crt"
//! backend:
//!   host: "127.0.0.1"
//!   port: 5432
//! ```

mod loader;
mod types;

pub use loader::{apply_env_overrides, apply_overrides_from, load_config, load_config_from_str};
pub use types::*;
