//! Interception hooks
//!
//! A [`SessionHooks`] implementation sees every chunk relayed in either
//! direction, the negotiated TLS state of the client, and every error the
//! proxy produces. All methods default to no-ops, so implementors override
//! only what they need.
//!
//! ```ignore
//! let hooks = CallbackHooks::builder()
//!     .on_read(|bytes, state| {
//!         println!("{} bytes over {:?}", bytes.len(), state.protocol_name());
//!         Ok(())
//!     })
//!     .on_error(|err| eprintln!("session failed: {}", err))
//!     .build();
//! let proxy = Proxy::new(config, acceptor).with_hooks(hooks);
//! ```

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::error::ProxyError;
use crate::tls::TlsSessionState;

/// Error returned by a hook to fail a transfer or a session
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct HookError {
    message: String,
}

impl HookError {
    /// Create a hook error with the given message
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The message the hook failed with
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Callbacks invoked by the proxy for every session.
///
/// Implementations are shared by all connection tasks, so they must be
/// `Send + Sync`. They run inline on the relay tasks: a slow hook stalls the
/// leg it was called from.
pub trait SessionHooks: Send + Sync + 'static {
    /// Called after every successful read of at least one byte, on either leg.
    ///
    /// Returning an error fails the read and terminates the session.
    fn on_read(&self, bytes: &[u8], state: &TlsSessionState) -> Result<(), HookError> {
        let _ = (bytes, state);
        Ok(())
    }

    /// Called after every successful write of at least one byte, on either leg.
    ///
    /// Returning an error fails the write and terminates the session.
    fn on_write(&self, bytes: &[u8], state: &TlsSessionState) -> Result<(), HookError> {
        let _ = (bytes, state);
        Ok(())
    }

    /// Called once per session right after the TLS handshake, before the
    /// backend is dialed. Returning an error closes the client connection.
    fn on_client_state(&self, state: &TlsSessionState) -> Result<(), HookError> {
        let _ = state;
        Ok(())
    }

    /// Error sink. Receives every accept and session error exactly once.
    fn on_error(&self, err: &ProxyError) {
        let _ = err;
    }
}

/// Hooks that do nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHooks;

impl SessionHooks for NoopHooks {}

impl<H: SessionHooks + ?Sized> SessionHooks for Arc<H> {
    fn on_read(&self, bytes: &[u8], state: &TlsSessionState) -> Result<(), HookError> {
        (**self).on_read(bytes, state)
    }

    fn on_write(&self, bytes: &[u8], state: &TlsSessionState) -> Result<(), HookError> {
        (**self).on_write(bytes, state)
    }

    fn on_client_state(&self, state: &TlsSessionState) -> Result<(), HookError> {
        (**self).on_client_state(state)
    }

    fn on_error(&self, err: &ProxyError) {
        (**self).on_error(err)
    }
}

type TransferFn = dyn Fn(&[u8], &TlsSessionState) -> Result<(), HookError> + Send + Sync;
type ClientStateFn = dyn Fn(&TlsSessionState) -> Result<(), HookError> + Send + Sync;
type ErrorFn = dyn Fn(&ProxyError) + Send + Sync;

/// Closure-backed hooks.
///
/// Callbacks left unset by [`CallbackHooksBuilder`] are replaced with no-ops
/// when the hooks are built.
pub struct CallbackHooks {
    read: Box<TransferFn>,
    write: Box<TransferFn>,
    client_state: Box<ClientStateFn>,
    error: Box<ErrorFn>,
}

impl CallbackHooks {
    /// Start building closure-backed hooks
    pub fn builder() -> CallbackHooksBuilder {
        CallbackHooksBuilder::default()
    }
}

impl fmt::Debug for CallbackHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackHooks").finish_non_exhaustive()
    }
}

impl SessionHooks for CallbackHooks {
    fn on_read(&self, bytes: &[u8], state: &TlsSessionState) -> Result<(), HookError> {
        (self.read)(bytes, state)
    }

    fn on_write(&self, bytes: &[u8], state: &TlsSessionState) -> Result<(), HookError> {
        (self.write)(bytes, state)
    }

    fn on_client_state(&self, state: &TlsSessionState) -> Result<(), HookError> {
        (self.client_state)(state)
    }

    fn on_error(&self, err: &ProxyError) {
        (self.error)(err)
    }
}

/// Builder for [`CallbackHooks`]
#[derive(Default)]
pub struct CallbackHooksBuilder {
    read: Option<Box<TransferFn>>,
    write: Option<Box<TransferFn>>,
    client_state: Option<Box<ClientStateFn>>,
    error: Option<Box<ErrorFn>>,
}

impl CallbackHooksBuilder {
    /// Set the read hook
    pub fn on_read<F>(mut self, f: F) -> Self
    where
        F: Fn(&[u8], &TlsSessionState) -> Result<(), HookError> + Send + Sync + 'static,
    {
        self.read = Some(Box::new(f));
        self
    }

    /// Set the write hook
    pub fn on_write<F>(mut self, f: F) -> Self
    where
        F: Fn(&[u8], &TlsSessionState) -> Result<(), HookError> + Send + Sync + 'static,
    {
        self.write = Some(Box::new(f));
        self
    }

    /// Set the post-handshake client state hook
    pub fn on_client_state<F>(mut self, f: F) -> Self
    where
        F: Fn(&TlsSessionState) -> Result<(), HookError> + Send + Sync + 'static,
    {
        self.client_state = Some(Box::new(f));
        self
    }

    /// Set the error sink
    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: Fn(&ProxyError) + Send + Sync + 'static,
    {
        self.error = Some(Box::new(f));
        self
    }

    /// Resolve unset callbacks to no-ops
    pub fn build(self) -> CallbackHooks {
        CallbackHooks {
            read: self.read.unwrap_or_else(|| Box::new(allow_transfer)),
            write: self.write.unwrap_or_else(|| Box::new(allow_transfer)),
            client_state: self
                .client_state
                .unwrap_or_else(|| Box::new(allow_client_state)),
            error: self.error.unwrap_or_else(|| Box::new(ignore_error)),
        }
    }
}

fn allow_transfer(_: &[u8], _: &TlsSessionState) -> Result<(), HookError> {
    Ok(())
}

fn allow_client_state(_: &TlsSessionState) -> Result<(), HookError> {
    Ok(())
}

fn ignore_error(_: &ProxyError) {}
