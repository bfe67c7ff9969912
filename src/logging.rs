//! Logging macros that pin the tracing target to "pg_tls_proxy".
//!
//! Without an explicit target, tracing uses the full module path
//! (e.g. "pg_tls_proxy::server::relay"). Embedding applications filter on a
//! single target instead, so every log call in this crate goes through here.

macro_rules! trace {
    ($($arg:tt)*) => { ::tracing::trace!(target: "pg_tls_proxy", $($arg)*) };
}

macro_rules! debug {
    ($($arg:tt)*) => { ::tracing::debug!(target: "pg_tls_proxy", $($arg)*) };
}

macro_rules! info {
    ($($arg:tt)*) => { ::tracing::info!(target: "pg_tls_proxy", $($arg)*) };
}
