//! Startup message codec
//!
//! Startup-phase messages carry no type byte: Length (4, includes itself) +
//! Code (4) + Body. The code tells an SSLRequest, GSSENCRequest or
//! CancelRequest apart from a regular StartupMessage (whose code is the
//! protocol version).

use std::collections::HashMap;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{ProxyError, Result};

use super::constants::*;
use super::messages::*;

/// Type of startup message received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartupMessageType {
    /// Regular startup message with connection parameters
    Startup(StartupMessage),
    /// SSL upgrade request
    SSLRequest,
    /// GSSAPI encryption request
    GssEncRequest,
    /// Query cancellation request
    CancelRequest(CancelRequest),
}

impl StartupMessageType {
    /// Short name for logging
    pub fn name(&self) -> &'static str {
        match self {
            StartupMessageType::Startup(_) => "StartupMessage",
            StartupMessageType::SSLRequest => "SSLRequest",
            StartupMessageType::GssEncRequest => "GSSENCRequest",
            StartupMessageType::CancelRequest(_) => "CancelRequest",
        }
    }
}

/// Read a u32 in big-endian format.
async fn read_u32_be<R: AsyncRead + Unpin>(reader: &mut R) -> Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf).await?;
    Ok(u32::from_be_bytes(buf))
}

/// Write a u32 in big-endian format.
async fn write_u32_be<W: AsyncWrite + Unpin>(writer: &mut W, value: u32) -> Result<()> {
    writer.write_all(&value.to_be_bytes()).await?;
    Ok(())
}

/// Read a null-terminated string from a buffer at the given offset.
/// Returns the string and the number of bytes consumed (including null).
fn read_cstring_from_buf(buf: &[u8], offset: usize) -> Result<(String, usize)> {
    let end = buf[offset..]
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| ProxyError::Protocol("Missing null terminator in string".into()))?;

    let s = std::str::from_utf8(&buf[offset..offset + end])
        .map_err(|_| ProxyError::Protocol("Invalid UTF-8 in string".into()))?;

    Ok((s.to_string(), end + 1))
}

/// Read exactly one startup message from a new connection.
///
/// Reads the whole packet (as announced by its length field) before
/// interpreting it, so nothing of the first message is left in the stream.
///
/// # Errors
///
/// - [`ProxyError::Io`] if the stream ends or fails before the full packet arrived
/// - [`ProxyError::Protocol`] if the length is out of range, the code is
///   unknown, or the body is malformed
pub async fn read_startup_message<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> Result<StartupMessageType> {
    let length = read_u32_be(reader).await?;

    if length < MIN_STARTUP_LENGTH {
        return Err(ProxyError::Protocol(format!(
            "Startup message too short: {} bytes",
            length
        )));
    }
    if length > MAX_STARTUP_LENGTH {
        return Err(ProxyError::Protocol(format!(
            "Startup message too large: {} bytes (max: {})",
            length, MAX_STARTUP_LENGTH
        )));
    }

    let mut body = vec![0u8; (length - 4) as usize];
    reader.read_exact(&mut body).await?;

    parse_startup_body(length, &body)
}

/// Interpret a startup packet body (everything after the length field).
fn parse_startup_body(length: u32, body: &[u8]) -> Result<StartupMessageType> {
    let code = u32::from_be_bytes([body[0], body[1], body[2], body[3]]);
    let rest = &body[4..];

    match code {
        // Bytes after the code are read and ignored
        SSL_REQUEST_CODE => Ok(StartupMessageType::SSLRequest),
        GSSENC_REQUEST_CODE => Ok(StartupMessageType::GssEncRequest),

        CANCEL_REQUEST_CODE => {
            if length != CancelRequest::LENGTH {
                return Err(ProxyError::Protocol(format!(
                    "Cancel request with invalid length: {}",
                    length
                )));
            }
            Ok(StartupMessageType::CancelRequest(CancelRequest {
                process_id: u32::from_be_bytes([rest[0], rest[1], rest[2], rest[3]]),
                secret_key: u32::from_be_bytes([rest[4], rest[5], rest[6], rest[7]]),
            }))
        }

        PROTOCOL_VERSION_3_0 => {
            let parameters = parse_parameters(rest)?;
            Ok(StartupMessageType::Startup(StartupMessage {
                protocol_version: code,
                parameters,
            }))
        }

        _ => Err(ProxyError::Protocol(format!(
            "Unknown startup message code: {}",
            code
        ))),
    }
}

/// Parse null-terminated key-value pairs, ending with an empty key.
fn parse_parameters(buf: &[u8]) -> Result<HashMap<String, String>> {
    let mut parameters = HashMap::new();
    let mut offset = 0;

    loop {
        if offset >= buf.len() {
            return Err(ProxyError::Protocol(
                "Startup parameters not terminated".into(),
            ));
        }

        let (key, key_len) = read_cstring_from_buf(buf, offset)?;
        offset += key_len;

        if key.is_empty() {
            break;
        }

        if offset >= buf.len() {
            return Err(ProxyError::Protocol(format!(
                "Missing value for parameter {}",
                key
            )));
        }
        let (value, value_len) = read_cstring_from_buf(buf, offset)?;
        offset += value_len;

        parameters.insert(key, value);
    }

    Ok(parameters)
}

/// Write the single-byte answer to a startup message.
pub async fn write_ssl_response<W: AsyncWrite + Unpin>(
    writer: &mut W,
    accept: bool,
) -> Result<()> {
    let marker = if accept { SSL_ACCEPTED } else { SSL_REJECTED };
    writer.write_all(&[marker]).await?;
    writer.flush().await?;
    Ok(())
}

/// Write an SSL request.
pub async fn write_ssl_request<W: AsyncWrite + Unpin>(writer: &mut W) -> Result<()> {
    write_u32_be(writer, MIN_STARTUP_LENGTH).await?;
    write_u32_be(writer, SSL_REQUEST_CODE).await?;
    writer.flush().await?;
    Ok(())
}

/// Write a cancel request.
pub async fn write_cancel_request<W: AsyncWrite + Unpin>(
    writer: &mut W,
    request: &CancelRequest,
) -> Result<()> {
    write_u32_be(writer, CancelRequest::LENGTH).await?;
    write_u32_be(writer, CANCEL_REQUEST_CODE).await?;
    write_u32_be(writer, request.process_id).await?;
    write_u32_be(writer, request.secret_key).await?;
    writer.flush().await?;
    Ok(())
}

/// Write a startup message.
pub async fn write_startup_message<W: AsyncWrite + Unpin>(
    writer: &mut W,
    msg: &StartupMessage,
) -> Result<()> {
    let mut content = Vec::new();

    content.extend_from_slice(&msg.protocol_version.to_be_bytes());

    for (key, value) in &msg.parameters {
        content.extend_from_slice(key.as_bytes());
        content.push(0);
        content.extend_from_slice(value.as_bytes());
        content.push(0);
    }

    // Terminating null
    content.push(0);

    let length = (content.len() + 4) as u32;
    write_u32_be(writer, length).await?;
    writer.write_all(&content).await?;
    writer.flush().await?;

    Ok(())
}
