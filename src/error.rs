//! Error types for pg-tls-proxy

use std::io;

use thiserror::Error;

use crate::hooks::HookError;
use crate::server::Direction;
use crate::tls::TlsError;

/// Main error type for the proxy
///
/// Every error a session can hit ends up as one of these and is handed to
/// [`SessionHooks::on_error`](crate::SessionHooks::on_error). Only
/// [`ProxyError::Listen`] escapes [`Proxy::serve`](crate::Proxy::serve).
#[derive(Error, Debug)]
pub enum ProxyError {
    /// Binding the listening socket failed
    #[error("Failed to listen on {address}: {source}")]
    Listen {
        /// Address we tried to bind
        address: String,
        #[source]
        source: io::Error,
    },

    /// Accepting a client connection failed
    #[error("Accept error: {0}")]
    Accept(#[source] io::Error),

    /// I/O error (network, file)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed or unsupported startup message
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The client's first message was not an SSLRequest
    #[error("client request not ssl")]
    NotSslRequest,

    /// TLS/SSL error
    #[error("TLS error: {0}")]
    Tls(#[from] TlsError),

    /// Timeout error
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Dialing the backend failed
    #[error("Failed to connect to backend {address}: {source}")]
    BackendConnect {
        /// Backend address
        address: String,
        #[source]
        source: io::Error,
    },

    /// One relay direction failed
    #[error("Relay {direction} failed: {source}")]
    Relay {
        /// Direction that terminated first
        direction: Direction,
        #[source]
        source: io::Error,
    },

    /// A hook rejected the session or a transfer
    #[error("Hook error: {0}")]
    Hook(#[from] HookError),

    /// A connection or relay task panicked
    #[error("Connection task panicked: {0}")]
    TaskPanic(String),
}

impl ProxyError {
    /// Convert a relay I/O error, unwrapping hook failures carried inside it.
    ///
    /// [`InterceptedStream`](crate::server::InterceptedStream) reports hook
    /// failures as `io::Error`s so the copy loop treats them like transport
    /// errors; this turns them back into [`ProxyError::Hook`].
    pub fn from_relay(direction: Direction, err: io::Error) -> Self {
        let is_hook = err.get_ref().is_some_and(|inner| inner.is::<HookError>());
        if !is_hook {
            return ProxyError::Relay {
                direction,
                source: err,
            };
        }
        let kind = err.kind();
        match err.into_inner().map(|inner| inner.downcast::<HookError>()) {
            Some(Ok(hook)) => ProxyError::Hook(*hook),
            Some(Err(inner)) => ProxyError::Relay {
                direction,
                source: io::Error::new(kind, inner),
            },
            None => ProxyError::Relay {
                direction,
                source: io::Error::from(kind),
            },
        }
    }

    /// True for the expected rejection of a client that did not ask for SSL
    pub fn is_not_ssl_request(&self) -> bool {
        matches!(self, ProxyError::NotSslRequest)
    }
}

/// Result type alias for ProxyError
pub type Result<T> = std::result::Result<T, ProxyError>;

impl From<tokio::task::JoinError> for ProxyError {
    fn from(err: tokio::task::JoinError) -> Self {
        if !err.is_panic() {
            return ProxyError::Io(err.into());
        }
        let payload = err.into_panic();
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_string()
        };
        ProxyError::TaskPanic(message)
    }
}

impl From<serde_yaml::Error> for ProxyError {
    fn from(err: serde_yaml::Error) -> Self {
        ProxyError::Config(err.to_string())
    }
}
