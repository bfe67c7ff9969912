//! TCP listener and per-connection fault boundary

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;

use super::connection::Connection;
use crate::error::{ProxyError, Result};
use crate::hooks::SessionHooks;
use crate::proxy::ProxyConfig;
use crate::tls::TlsAcceptor;

/// Delay before accepting again after an accept error
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Listener statistics
#[derive(Debug, Default)]
pub struct ListenerStats {
    /// Total connections accepted
    pub connections_accepted: AtomicU64,
    /// Currently active connections
    pub connections_active: AtomicU64,
    /// Connections that ended with an error (including panics)
    pub connections_failed: AtomicU64,
}

/// TCP listener that accepts client connections
pub struct Listener {
    /// TCP listener
    listener: TcpListener,
    config: Arc<ProxyConfig>,
    acceptor: TlsAcceptor,
    hooks: Arc<dyn SessionHooks>,
    /// Statistics
    stats: Arc<ListenerStats>,
}

impl Listener {
    /// Bind to the configured listen address
    pub async fn bind(
        config: Arc<ProxyConfig>,
        acceptor: TlsAcceptor,
        hooks: Arc<dyn SessionHooks>,
    ) -> Result<Self> {
        let listener = TcpListener::bind(&config.listen_address)
            .await
            .map_err(|e| ProxyError::Listen {
                address: config.listen_address.clone(),
                source: e,
            })?;

        info!(
            "Listening on {}, forwarding to {}",
            config.listen_address, config.backend_address
        );

        Ok(Self {
            listener,
            config,
            acceptor,
            hooks,
            stats: Arc::new(ListenerStats::default()),
        })
    }

    /// Get listener statistics
    pub fn stats(&self) -> Arc<ListenerStats> {
        Arc::clone(&self.stats)
    }

    /// Get the local address the listener is bound to.
    ///
    /// This is useful when binding to port 0 to get an OS-assigned port.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }

    /// Run the accept loop.
    ///
    /// Never returns on its own: accept errors are reported to the error
    /// sink and the loop keeps going. Drop the future to stop listening.
    pub async fn run(self) -> Result<()> {
        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    debug!("Accepted connection from {}", addr);
                    self.stats
                        .connections_accepted
                        .fetch_add(1, Ordering::Relaxed);
                    self.stats.connections_active.fetch_add(1, Ordering::Relaxed);

                    let connection = Connection::new(
                        stream,
                        addr,
                        Arc::clone(&self.config),
                        self.acceptor.clone(),
                        Arc::clone(&self.hooks),
                    );
                    let session = tokio::spawn(connection.handle());

                    let hooks = Arc::clone(&self.hooks);
                    let stats = Arc::clone(&self.stats);
                    tokio::spawn(async move {
                        // A panic in the session task surfaces here as a JoinError
                        let result = match session.await {
                            Ok(result) => result,
                            Err(join_err) => Err(ProxyError::from(join_err)),
                        };
                        stats.connections_active.fetch_sub(1, Ordering::Relaxed);
                        if let Err(e) = result {
                            stats.connections_failed.fetch_add(1, Ordering::Relaxed);
                            hooks.on_error(&e);
                        }
                        debug!("Connection from {} closed", addr);
                    });
                }
                Err(e) => {
                    self.hooks.on_error(&ProxyError::Accept(e));
                    tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                }
            }
        }
    }
}
