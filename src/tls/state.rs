//! Negotiated TLS session snapshot

use rustls::pki_types::CertificateDer;
use rustls::{CipherSuite, ProtocolVersion, ServerConnection};

/// Snapshot of a client's negotiated TLS session.
///
/// Captured once, after the handshake has fully completed, and shared
/// read-only by every hook invocation of the session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlsSessionState {
    /// Negotiated protocol version
    pub protocol_version: Option<ProtocolVersion>,
    /// Negotiated cipher suite
    pub cipher_suite: Option<CipherSuite>,
    /// Verified client certificate chain, end-entity first
    pub peer_certificates: Vec<CertificateDer<'static>>,
    /// ALPN protocol agreed with the client, if any
    pub alpn_protocol: Option<Vec<u8>>,
    /// SNI server name sent by the client, if any
    pub server_name: Option<String>,
}

impl TlsSessionState {
    /// Capture the state of a server connection.
    ///
    /// Only call after the handshake is complete; before that the fields
    /// are not yet negotiated.
    pub(crate) fn capture(conn: &ServerConnection) -> Self {
        debug_assert!(!conn.is_handshaking());
        Self {
            protocol_version: conn.protocol_version(),
            cipher_suite: conn.negotiated_cipher_suite().map(|cs| cs.suite()),
            peer_certificates: conn
                .peer_certificates()
                .map(|certs| certs.iter().map(|c| c.clone().into_owned()).collect())
                .unwrap_or_default(),
            alpn_protocol: conn.alpn_protocol().map(|p| p.to_vec()),
            server_name: conn.server_name().map(str::to_string),
        }
    }

    /// Human-readable protocol version
    pub fn protocol_name(&self) -> Option<&'static str> {
        self.protocol_version.map(|v| match v {
            ProtocolVersion::TLSv1_2 => "TLSv1.2",
            ProtocolVersion::TLSv1_3 => "TLSv1.3",
            _ => "TLS (unknown version)",
        })
    }

    /// Human-readable cipher suite name
    pub fn cipher_suite_name(&self) -> Option<&'static str> {
        self.cipher_suite
            .map(|cs| cs.as_str().unwrap_or("TLS (unknown cipher)"))
    }

    /// The client's end-entity certificate
    pub fn peer_certificate(&self) -> Option<&CertificateDer<'static>> {
        self.peer_certificates.first()
    }
}
