//! pg-tls-proxy - TLS-terminating proxy for the PostgreSQL wire protocol
//!
//! This library provides the core functionality for a proxy that:
//! - Answers the client's SSLRequest and terminates TLS with mandatory
//!   client certificate authentication
//! - Rejects every other startup message with `'N'`
//! - Relays decrypted traffic to a plaintext backend
//! - Reports every relayed chunk, the negotiated TLS state and every error
//!   through pluggable [`hooks`]
//!
//! ```ignore
//! let config = ProxyConfig::new("0.0.0.0:5433", "127.0.0.1:5432");
//! let material = TlsMaterial::new("server.crt", "server.key", "ca.crt");
//! Proxy::from_material(config, &material)?
//!     .with_hooks(CallbackHooks::builder().on_error(|e| eprintln!("{}", e)).build())
//!     .serve()
//!     .await?;
//! ```

#[macro_use]
mod logging;

pub mod config;
pub mod error;
pub mod hooks;
pub mod protocol;
pub mod proxy;
pub mod server;
pub mod tls;

pub use config::Config;
pub use error::{ProxyError, Result};
pub use hooks::{CallbackHooks, CallbackHooksBuilder, HookError, NoopHooks, SessionHooks};
pub use proxy::{Proxy, ProxyConfig};
pub use server::{Direction, Listener, ListenerStats, RelayOutcome};
pub use tls::{TlsAcceptor, TlsError, TlsMaterial, TlsSessionState};
