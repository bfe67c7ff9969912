//! Proxy entry point
//!
//! [`Proxy`] bundles the immutable per-process values every connection task
//! needs: addresses and timeouts ([`ProxyConfig`]), the TLS acceptor, and the
//! hooks.

use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;
use crate::hooks::{NoopHooks, SessionHooks};
use crate::server::Listener;
use crate::tls::{TlsAcceptor, TlsMaterial};

/// Addresses and timeouts shared by every connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    /// Address to listen on (`host:port`)
    pub listen_address: String,
    /// Backend to forward to (`host:port`)
    pub backend_address: String,
    /// Bound on startup-message read, marker write and TLS handshake
    pub handshake_timeout: Option<Duration>,
    /// Bound on each relay read
    pub idle_timeout: Option<Duration>,
}

impl ProxyConfig {
    /// Config with no timeouts
    pub fn new(listen_address: impl Into<String>, backend_address: impl Into<String>) -> Self {
        Self {
            listen_address: listen_address.into(),
            backend_address: backend_address.into(),
            handshake_timeout: None,
            idle_timeout: None,
        }
    }

    /// Set the handshake timeout
    pub fn with_handshake_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Set the relay idle timeout
    pub fn with_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.idle_timeout = timeout;
        self
    }
}

/// TLS-terminating proxy
pub struct Proxy {
    config: Arc<ProxyConfig>,
    acceptor: TlsAcceptor,
    hooks: Arc<dyn SessionHooks>,
}

impl Proxy {
    /// Create a proxy with no-op hooks
    pub fn new(config: ProxyConfig, acceptor: TlsAcceptor) -> Self {
        Self {
            config: Arc::new(config),
            acceptor,
            hooks: Arc::new(NoopHooks),
        }
    }

    /// Create a proxy loading the TLS acceptor from PEM files
    pub fn from_material(config: ProxyConfig, material: &TlsMaterial) -> Result<Self> {
        let acceptor = TlsAcceptor::new(material)?;
        Ok(Self::new(config, acceptor))
    }

    /// Replace the hooks
    pub fn with_hooks<H: SessionHooks>(mut self, hooks: H) -> Self {
        self.hooks = Arc::new(hooks);
        self
    }

    /// The proxy configuration
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Bind the listening socket without starting the accept loop
    pub async fn bind(&self) -> Result<Listener> {
        Listener::bind(
            Arc::clone(&self.config),
            self.acceptor.clone(),
            Arc::clone(&self.hooks),
        )
        .await
    }

    /// Bind and accept connections forever.
    ///
    /// Only a bind failure ([`ProxyError::Listen`](crate::ProxyError::Listen))
    /// is returned; everything else goes to the hooks' error sink.
    pub async fn serve(self) -> Result<()> {
        self.bind().await?.run().await
    }
}
