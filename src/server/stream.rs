//! Interception-aware stream adapter
//!
//! `InterceptedStream` wraps one leg of a session (the client TLS stream or
//! the backend TCP stream) and calls the session hooks with exactly the bytes
//! each successful read or write transferred. A hook failure is returned as
//! an `io::Error` wrapping the [`HookError`](crate::HookError), so the copy
//! loop driving the stream stops as it would on a transport error.

use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::task::{ready, Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use super::Direction;
use crate::hooks::SessionHooks;
use crate::tls::TlsSessionState;

const OPEN: u8 = 0;
const CLOSED_BY_CLIENT_TO_BACKEND: u8 = 1;
const CLOSED_BY_BACKEND_TO_CLIENT: u8 = 2;

/// Shared "session closed" flag, remembering which direction closed it.
///
/// Both legs of a session hold a clone. Once closed, the adapters refuse
/// further transfers and no hook is invoked again for the session. Only the
/// first `close` counts.
#[derive(Debug, Clone, Default)]
pub struct CloseSignal(Arc<AtomicU8>);

impl CloseSignal {
    /// Create an open signal
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the session closed by `direction`.
    ///
    /// Returns `false` if another direction closed it first.
    pub fn close(&self, direction: Direction) -> bool {
        let code = match direction {
            Direction::ClientToBackend => CLOSED_BY_CLIENT_TO_BACKEND,
            Direction::BackendToClient => CLOSED_BY_BACKEND_TO_CLIENT,
        };
        self.0
            .compare_exchange(OPEN, code, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Whether the session has been closed
    pub fn is_closed(&self) -> bool {
        self.0.load(Ordering::Acquire) != OPEN
    }

    /// The direction that closed the session, if any
    pub fn closed_by(&self) -> Option<Direction> {
        match self.0.load(Ordering::Acquire) {
            CLOSED_BY_CLIENT_TO_BACKEND => Some(Direction::ClientToBackend),
            CLOSED_BY_BACKEND_TO_CLIENT => Some(Direction::BackendToClient),
            _ => None,
        }
    }
}

fn session_closed() -> io::Error {
    io::Error::new(io::ErrorKind::ConnectionAborted, "session closed")
}

/// A stream that reports every transferred chunk to the session hooks
pub struct InterceptedStream<S> {
    inner: S,
    hooks: Arc<dyn SessionHooks>,
    state: Arc<TlsSessionState>,
    closed: CloseSignal,
}

impl<S> InterceptedStream<S> {
    /// Wrap `inner`, reporting to `hooks` with the session snapshot `state`
    pub fn new(
        inner: S,
        hooks: Arc<dyn SessionHooks>,
        state: Arc<TlsSessionState>,
        closed: CloseSignal,
    ) -> Self {
        Self {
            inner,
            hooks,
            state,
            closed,
        }
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for InterceptedStream<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.closed.is_closed() {
            return Poll::Ready(Err(session_closed()));
        }

        let before = buf.filled().len();
        ready!(Pin::new(&mut this.inner).poll_read(cx, buf))?;

        let read = &buf.filled()[before..];
        if read.is_empty() {
            // EOF goes straight to the caller
            return Poll::Ready(Ok(()));
        }
        if this.closed.is_closed() {
            buf.set_filled(before);
            return Poll::Ready(Err(session_closed()));
        }
        if let Err(e) = this.hooks.on_read(read, &this.state) {
            buf.set_filled(before);
            return Poll::Ready(Err(io::Error::other(e)));
        }

        Poll::Ready(Ok(()))
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for InterceptedStream<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        if this.closed.is_closed() {
            return Poll::Ready(Err(session_closed()));
        }

        let n = ready!(Pin::new(&mut this.inner).poll_write(cx, buf))?;
        if n == 0 {
            return Poll::Ready(Ok(0));
        }
        if this.closed.is_closed() {
            return Poll::Ready(Err(session_closed()));
        }
        if let Err(e) = this.hooks.on_write(&buf[..n], &this.state) {
            return Poll::Ready(Err(io::Error::other(e)));
        }

        Poll::Ready(Ok(n))
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}
