//! TLS Acceptor for client connections
//!
//! Builds the immutable server configuration (certificate chain, mandatory
//! client authentication, CA trust pool) once and drives the server-side
//! handshake for every session that asked for SSL.

use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::{RootCertStore, ServerConfig};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_rustls::server::TlsStream;

use crate::tls::{
    load_ca_roots, load_certificates, load_private_key, PemKind, TlsError, TlsMaterial,
    TlsSessionState,
};

/// TLS Acceptor requiring client certificates
///
/// Cheap to clone; every clone shares the same `ServerConfig`.
///
/// # Example
///
/// ```ignore
/// let material = TlsMaterial::new("server.crt", "server.key", "ca.crt");
/// let acceptor = TlsAcceptor::new(&material)?;
/// let (tls_stream, state) = acceptor.accept(tcp_stream).await?;
/// ```
#[derive(Clone)]
pub struct TlsAcceptor {
    inner: tokio_rustls::TlsAcceptor,
}

impl TlsAcceptor {
    /// Create a new TLS acceptor from PEM files
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - any of the three paths is missing
    /// - a file cannot be read or parsed
    /// - the CA bundle holds no certificate
    /// - the key does not match the certificate
    pub fn new(material: &TlsMaterial) -> Result<Self, TlsError> {
        material.validate().map_err(TlsError::MissingMaterial)?;
        let (Some(cert_path), Some(key_path), Some(ca_path)) =
            (&material.cert_path, &material.key_path, &material.ca_path)
        else {
            return Err(TlsError::MissingMaterial(
                "cert_path, key_path and ca_path are required".to_string(),
            ));
        };

        let certs = load_certificates(cert_path)?;
        if certs.is_empty() {
            return Err(TlsError::empty_pem(PemKind::Certificate, cert_path));
        }
        let key = load_private_key(key_path)?;
        let roots = load_ca_roots(ca_path)?;

        Self::from_parts(certs, key, roots)
    }

    /// Create an acceptor from already-parsed material
    pub fn from_parts(
        certs: Vec<CertificateDer<'static>>,
        key: PrivateKeyDer<'static>,
        roots: RootCertStore,
    ) -> Result<Self, TlsError> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());

        // Anonymous clients are rejected: the verifier is built without
        // allow_unauthenticated().
        let verifier =
            WebPkiClientVerifier::builder_with_provider(Arc::new(roots), Arc::clone(&provider))
                .build()?;

        let server_config = ServerConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .map_err(TlsError::ServerConfig)?
            .with_client_cert_verifier(verifier)
            .with_single_cert(certs, key)
            .map_err(TlsError::ServerConfig)?;

        Ok(Self::from_server_config(Arc::new(server_config)))
    }

    /// Wrap an externally built server configuration
    ///
    /// The caller is responsible for configuring client certificate
    /// verification on `config`.
    pub fn from_server_config(config: Arc<ServerConfig>) -> Self {
        Self {
            inner: tokio_rustls::TlsAcceptor::from(config),
        }
    }

    /// Run the server handshake over `stream`
    ///
    /// Resolves only once the handshake has completed, returning the TLS
    /// stream together with the session snapshot taken at that point.
    ///
    /// # Errors
    ///
    /// Returns [`TlsError::Handshake`] if the client certificate is missing
    /// or untrusted, the protocol negotiation fails, or the client
    /// disconnects mid-handshake.
    pub async fn accept<S>(
        &self,
        stream: S,
    ) -> Result<(TlsStream<S>, TlsSessionState), TlsError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let tls_stream = self
            .inner
            .accept(stream)
            .await
            .map_err(TlsError::Handshake)?;

        let state = TlsSessionState::capture(tls_stream.get_ref().1);
        debug!(
            "TLS handshake complete: {} / {}",
            state.protocol_name().unwrap_or("unknown"),
            state.cipher_suite_name().unwrap_or("unknown")
        );

        Ok((tls_stream, state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustls::pki_types::PrivatePkcs8KeyDer;
    use std::path::PathBuf;

    #[test]
    fn test_acceptor_missing_ca_path() {
        let material = TlsMaterial {
            cert_path: Some(PathBuf::from("/cert.pem")),
            key_path: Some(PathBuf::from("/key.pem")),
            ca_path: None,
        };

        let err = TlsAcceptor::new(&material).err().unwrap();
        assert!(matches!(err, TlsError::MissingMaterial(_)));
        assert!(err.to_string().contains("ca_path"));
    }

    #[test]
    fn test_acceptor_nonexistent_cert_file() {
        let material = TlsMaterial::new(
            "/nonexistent/cert.pem",
            "/nonexistent/key.pem",
            "/nonexistent/ca.pem",
        );

        let err = TlsAcceptor::new(&material).err().unwrap();
        assert!(matches!(
            err,
            TlsError::Pem {
                kind: PemKind::Certificate,
                ..
            }
        ));
    }

    #[test]
    fn test_from_parts_with_generated_chain() {
        let ca_key = rcgen::KeyPair::generate().unwrap();
        let mut ca_params = rcgen::CertificateParams::new(Vec::<String>::new()).unwrap();
        ca_params.is_ca = rcgen::IsCa::Ca(rcgen::BasicConstraints::Unconstrained);
        let ca = ca_params.self_signed(&ca_key).unwrap();

        let key = rcgen::KeyPair::generate().unwrap();
        let params = rcgen::CertificateParams::new(vec!["localhost".to_string()]).unwrap();
        let cert = params.signed_by(&key, &ca, &ca_key).unwrap();

        let mut roots = RootCertStore::empty();
        roots.add(ca.der().clone()).unwrap();
        let key_der = PrivatePkcs8KeyDer::from(key.serialize_der()).into();

        let result = TlsAcceptor::from_parts(vec![cert.der().clone()], key_der, roots);
        assert!(result.is_ok());
    }

    #[test]
    fn test_from_parts_rejects_empty_roots() {
        let key = rcgen::KeyPair::generate().unwrap();
        let cert = rcgen::CertificateParams::new(vec!["localhost".to_string()])
            .unwrap()
            .self_signed(&key)
            .unwrap();
        let key_der = PrivatePkcs8KeyDer::from(key.serialize_der()).into();

        let result =
            TlsAcceptor::from_parts(vec![cert.der().clone()], key_der, RootCertStore::empty());
        assert!(matches!(result, Err(TlsError::ClientVerifier(_))));
    }
}
