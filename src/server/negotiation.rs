//! SSL negotiation
//!
//! The first message of every connection decides its fate:
//!
//! 1. SSLRequest: answer `'S'`, the TLS handshake follows on the same socket
//! 2. Anything else (StartupMessage, CancelRequest, GSSENCRequest): answer
//!    `'N'` and end the session with [`ProxyError::NotSslRequest`]
//!
//! Unparseable or truncated messages fail before any answer is written.

use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::{ProxyError, Result};
use crate::protocol::{read_startup_message, write_ssl_response, StartupMessageType};

/// Run the SSL negotiation on a freshly accepted stream.
///
/// Returns `Ok(())` once `'S'` has been written and flushed; the caller
/// must start the TLS handshake next.
pub async fn negotiate<S>(stream: &mut S) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let message = read_startup_message(stream).await?;

    match message {
        StartupMessageType::SSLRequest => {
            write_ssl_response(stream, true).await?;
            debug!("Accepted SSLRequest, starting TLS handshake");
            Ok(())
        }
        other => {
            debug!("Rejecting {}: SSL is required", other.name());
            write_ssl_response(stream, false).await?;
            Err(ProxyError::NotSslRequest)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{write_ssl_request, write_startup_message, StartupMessage};
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_ssl_request_answered_with_s() {
        let (mut client, mut proxy) = duplex(64);
        write_ssl_request(&mut client).await.unwrap();

        negotiate(&mut proxy).await.unwrap();
        drop(proxy);

        let mut reply = Vec::new();
        client.read_to_end(&mut reply).await.unwrap();
        assert_eq!(reply, b"S");
    }

    #[tokio::test]
    async fn test_startup_message_answered_with_n() {
        let (mut client, mut proxy) = duplex(256);
        write_startup_message(&mut client, &StartupMessage::new("postgres"))
            .await
            .unwrap();

        let err = negotiate(&mut proxy).await.unwrap_err();
        assert!(err.is_not_ssl_request());
        drop(proxy);

        let mut reply = Vec::new();
        client.read_to_end(&mut reply).await.unwrap();
        assert_eq!(reply, b"N");
    }

    #[tokio::test]
    async fn test_gssenc_request_answered_with_n() {
        let (mut client, mut proxy) = duplex(64);
        client
            .write_all(&[0x00, 0x00, 0x00, 0x08, 0x04, 0xD2, 0x16, 0x30])
            .await
            .unwrap();

        let err = negotiate(&mut proxy).await.unwrap_err();
        assert!(err.is_not_ssl_request());
    }

    #[tokio::test]
    async fn test_truncated_message_gets_no_answer() {
        let (mut client, mut proxy) = duplex(64);
        client.write_all(&[0x00, 0x00, 0x00, 0x08, 0x04]).await.unwrap();
        client.shutdown().await.unwrap();

        let err = negotiate(&mut proxy).await.unwrap_err();
        assert!(matches!(err, ProxyError::Io(_)));
        drop(proxy);

        let mut reply = Vec::new();
        client.read_to_end(&mut reply).await.unwrap();
        assert!(reply.is_empty());
    }

    #[tokio::test]
    async fn test_handshake_bytes_left_in_stream() {
        let (mut client, mut proxy) = duplex(64);
        write_ssl_request(&mut client).await.unwrap();
        client.write_all(b"\x16\x03\x01").await.unwrap();

        negotiate(&mut proxy).await.unwrap();

        let mut next = [0u8; 3];
        proxy.read_exact(&mut next).await.unwrap();
        assert_eq!(&next, b"\x16\x03\x01");
    }
}
