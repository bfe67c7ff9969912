//! TLS termination for client connections
//!
//! ```text
//! ┌──────────┐  SSLRequest / 'S'  ┌───────────┐     plain TCP     ┌──────────┐
//! │  Client  │ ── mutual TLS ──── │   Proxy   │ ───────────────── │ Postgres │
//! │ (libpq)  │   (server-side)    │           │                   │  Server  │
//! └──────────┘                    └───────────┘                   └──────────┘
//! ```
//!
//! The proxy only ever acts as a TLS server. Every client must present a
//! certificate that chains to the configured CA bundle; anonymous clients
//! fail the handshake.
//!
//! # Configuration
//!
//! ```yaml
//! server:
//!   tls:
//!     cert_path: "/path/to/server.crt"
//!     key_path: "/path/to/server.key"
//!     ca_path: "/path/to/client-ca.crt"
//! ```
//!
//! # Security
//!
//! - rustls with the `ring` provider; randomness comes from the OS CSPRNG
//! - TLS 1.2 minimum, TLS 1.3 preferred
//! - Client certificates verified with webpki against the CA pool only

mod acceptor;
mod config;
mod error;
mod state;

pub use acceptor::TlsAcceptor;
pub use config::TlsMaterial;
pub use error::{PemKind, TlsError};
pub use state::TlsSessionState;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::RootCertStore;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Load certificates from a PEM file
///
/// Reads all certificates from a PEM-encoded file and returns them as
/// a vector of `CertificateDer`. This supports certificate chains.
pub(crate) fn load_certificates(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    read_certificates(path, PemKind::Certificate)
}

fn read_certificates(
    path: &Path,
    kind: PemKind,
) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let file = File::open(path).map_err(|e| TlsError::pem(kind, path, e))?;

    let mut reader = BufReader::new(file);

    rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| TlsError::pem(kind, path, e))
}

/// Load a private key from a PEM file
///
/// Reads a private key from a PEM-encoded file. Supports RSA, PKCS8, and EC keys.
pub(crate) fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, TlsError> {
    let file = File::open(path).map_err(|e| TlsError::pem(PemKind::PrivateKey, path, e))?;

    let mut reader = BufReader::new(file);

    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| TlsError::pem(PemKind::PrivateKey, path, e))?
        .ok_or_else(|| TlsError::empty_pem(PemKind::PrivateKey, path))
}

/// Load the trusted client CA pool from a PEM bundle
///
/// Fails if the bundle contains no usable certificate: an empty pool would
/// make every client handshake fail.
pub(crate) fn load_ca_roots(path: &Path) -> Result<RootCertStore, TlsError> {
    let mut roots = RootCertStore::empty();
    for cert in read_certificates(path, PemKind::CaBundle)? {
        roots.add(cert).map_err(|e| TlsError::InvalidCa {
            path: path.to_path_buf(),
            source: e,
        })?;
    }
    if roots.is_empty() {
        return Err(TlsError::empty_pem(PemKind::CaBundle, path));
    }
    Ok(roots)
}
