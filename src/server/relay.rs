//! Duplex relay between the client TLS stream and the backend
//!
//! Both legs are wrapped in [`InterceptedStream`]s sharing one session
//! snapshot and one [`CloseSignal`]. Each direction runs as its own task; the
//! first to finish decides the session's result, the other is aborted and its
//! result discarded. Once both tasks are gone every stream half has been
//! dropped, so both sockets are closed when [`Relay::run`] returns.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{split, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;

use super::stream::{CloseSignal, InterceptedStream};
use super::Direction;
use crate::error::{ProxyError, Result};
use crate::hooks::SessionHooks;
use crate::tls::TlsSessionState;

const RELAY_BUFFER_SIZE: usize = 8192;

/// How a relay ended when the first direction finished cleanly
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayOutcome {
    /// Direction that reached end-of-stream first
    pub direction: Direction,
    /// Bytes that direction forwarded
    pub bytes: u64,
}

/// A relay session between a client and a backend
pub struct Relay<C, B> {
    /// Client stream (TLS)
    client: C,
    /// Backend stream (plain TCP)
    backend: B,
    hooks: Arc<dyn SessionHooks>,
    state: Arc<TlsSessionState>,
    /// Per-read idle timeout (None = disabled)
    idle_timeout: Option<Duration>,
}

impl<C, B> Relay<C, B>
where
    C: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    B: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Create a relay without an idle timeout
    pub fn new(
        client: C,
        backend: B,
        hooks: Arc<dyn SessionHooks>,
        state: Arc<TlsSessionState>,
    ) -> Self {
        Self {
            client,
            backend,
            hooks,
            state,
            idle_timeout: None,
        }
    }

    /// Fail a direction that sees no data for `idle_timeout`
    pub fn with_idle_timeout(mut self, idle_timeout: Option<Duration>) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Run the relay until either direction terminates.
    ///
    /// Returns the result of the direction that closed the session first.
    /// The other direction is aborted; whatever it ended with is only
    /// logged.
    pub async fn run(self) -> Result<RelayOutcome> {
        debug!("Starting relay with idle_timeout={:?}", self.idle_timeout);

        let closed = CloseSignal::new();
        let client = InterceptedStream::new(
            self.client,
            Arc::clone(&self.hooks),
            Arc::clone(&self.state),
            closed.clone(),
        );
        let backend =
            InterceptedStream::new(self.backend, self.hooks, self.state, closed.clone());

        let (client_read, client_write) = split(client);
        let (backend_read, backend_write) = split(backend);

        let mut client_to_backend = tokio::spawn(copy_with_hooks(
            client_read,
            backend_write,
            Direction::ClientToBackend,
            self.idle_timeout,
            closed.clone(),
        ));
        let mut backend_to_client = tokio::spawn(copy_with_hooks(
            backend_read,
            client_write,
            Direction::BackendToClient,
            self.idle_timeout,
            closed.clone(),
        ));

        let (completed, result) = tokio::select! {
            result = &mut client_to_backend => (Direction::ClientToBackend, result),
            result = &mut backend_to_client => (Direction::BackendToClient, result),
        };
        closed.close(completed);

        // The task that completed first may only have seen the closed flag
        // set by the other one, which then owns the session's result.
        let direction = closed.closed_by().unwrap_or(completed);
        let (first, second) = if direction == completed {
            let other = match completed {
                Direction::ClientToBackend => backend_to_client,
                Direction::BackendToClient => client_to_backend,
            };
            other.abort();
            (result, other.await)
        } else {
            let winner = match direction {
                Direction::ClientToBackend => client_to_backend,
                Direction::BackendToClient => backend_to_client,
            };
            (winner.await, result)
        };
        debug!(
            "Relay ended by {}; discarded {} result: {:?}",
            direction,
            direction.reverse(),
            second
        );

        match first {
            Ok(Ok(bytes)) => Ok(RelayOutcome { direction, bytes }),
            Ok(Err(e)) => Err(ProxyError::from_relay(direction, e)),
            Err(join_err) => Err(join_err.into()),
        }
    }
}

/// Closes the session for its direction when dropped, including on panic
struct CloseOnExit {
    closed: CloseSignal,
    direction: Direction,
}

impl Drop for CloseOnExit {
    fn drop(&mut self) {
        self.closed.close(self.direction);
    }
}

/// Copy one direction until EOF or error, then mark the session closed
async fn copy_with_hooks<R, W>(
    reader: R,
    writer: W,
    direction: Direction,
    idle_timeout: Option<Duration>,
    closed: CloseSignal,
) -> io::Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let _close = CloseOnExit { closed, direction };
    copy_loop(reader, writer, direction, idle_timeout).await
}

async fn copy_loop<R, W>(
    mut reader: R,
    mut writer: W,
    direction: Direction,
    idle_timeout: Option<Duration>,
) -> io::Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; RELAY_BUFFER_SIZE];
    let mut total_bytes = 0u64;

    loop {
        let n = match idle_timeout {
            None => reader.read(&mut buf).await?,
            Some(limit) => match timeout(limit, reader.read(&mut buf)).await {
                Ok(result) => result?,
                Err(_) => {
                    debug!(
                        "{}: idle timeout ({:?}) after {} bytes",
                        direction, limit, total_bytes
                    );
                    return Err(io::Error::new(
                        io::ErrorKind::TimedOut,
                        format!("Idle timeout after {:?}", limit),
                    ));
                }
            },
        };

        if n == 0 {
            debug!("{}: EOF after {} bytes", direction, total_bytes);
            break;
        }

        trace!("{}: {} bytes", direction, n);
        writer.write_all(&buf[..n]).await?;
        writer.flush().await?;
        total_bytes += n as u64;
    }

    let _ = writer.shutdown().await;

    Ok(total_bytes)
}
