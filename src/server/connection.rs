//! Per-connection pipeline
//!
//! Negotiation → TLS handshake → client-state hook → backend dial → relay.
//! Every stage that fails ends the connection; the error is returned to the
//! listener, which reports it. Streams are owned by the stage that uses them,
//! so an early return drops (and closes) whatever sockets exist.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::server::TlsStream;
use tracing::{span, Instrument, Level};

use super::negotiation::negotiate;
use super::relay::Relay;
use crate::error::{ProxyError, Result};
use crate::hooks::SessionHooks;
use crate::proxy::ProxyConfig;
use crate::tls::{TlsAcceptor, TlsSessionState};

/// A proxied client connection
pub struct Connection {
    /// Client TCP stream
    stream: TcpStream,
    /// Client address
    client_addr: SocketAddr,
    config: Arc<ProxyConfig>,
    acceptor: TlsAcceptor,
    hooks: Arc<dyn SessionHooks>,
}

impl Connection {
    /// Create a connection for an accepted client stream
    pub fn new(
        stream: TcpStream,
        client_addr: SocketAddr,
        config: Arc<ProxyConfig>,
        acceptor: TlsAcceptor,
        hooks: Arc<dyn SessionHooks>,
    ) -> Self {
        Self {
            stream,
            client_addr,
            config,
            acceptor,
            hooks,
        }
    }

    /// Run the connection to completion.
    ///
    /// Returns `Ok(())` when the relay ended with a clean end-of-stream.
    pub async fn handle(self) -> Result<()> {
        let span = span!(
            target: "pg_tls_proxy",
            Level::INFO,
            "connection",
            client = %self.client_addr
        );
        self.run().instrument(span).await
    }

    async fn run(self) -> Result<()> {
        let Connection {
            stream,
            client_addr,
            config,
            acceptor,
            hooks,
        } = self;

        debug!("Negotiating SSL with {}", client_addr);
        let establish = establish(stream, &acceptor);
        let (mut tls_stream, state) = match config.handshake_timeout {
            Some(limit) => timeout(limit, establish).await.map_err(|_| {
                ProxyError::Timeout(format!("SSL negotiation and handshake exceeded {:?}", limit))
            })??,
            None => establish.await?,
        };

        if let Err(e) = hooks.on_client_state(&state) {
            debug!("Client state rejected: {}", e);
            let _ = tls_stream.shutdown().await;
            return Err(e.into());
        }

        let backend = match TcpStream::connect(&config.backend_address).await {
            Ok(backend) => backend,
            Err(e) => {
                let _ = tls_stream.shutdown().await;
                return Err(ProxyError::BackendConnect {
                    address: config.backend_address.clone(),
                    source: e,
                });
            }
        };
        debug!("Connected to backend {}", config.backend_address);

        let outcome = Relay::new(tls_stream, backend, hooks, Arc::new(state))
            .with_idle_timeout(config.idle_timeout)
            .run()
            .await?;
        info!(
            "Session ended: {} closed after {} bytes",
            outcome.direction, outcome.bytes
        );

        Ok(())
    }
}

/// Negotiate SSL and complete the TLS handshake
async fn establish(
    mut stream: TcpStream,
    acceptor: &TlsAcceptor,
) -> Result<(TlsStream<TcpStream>, TlsSessionState)> {
    negotiate(&mut stream).await?;
    let (tls_stream, state) = acceptor.accept(stream).await?;
    Ok((tls_stream, state))
}
