//! TLS-specific error types

use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Which piece of PEM material a load error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PemKind {
    /// Server certificate chain
    Certificate,
    /// Server private key
    PrivateKey,
    /// Client CA bundle
    CaBundle,
}

impl fmt::Display for PemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PemKind::Certificate => f.write_str("certificate"),
            PemKind::PrivateKey => f.write_str("private key"),
            PemKind::CaBundle => f.write_str("CA certificate"),
        }
    }
}

/// Errors building the acceptor or terminating a client's TLS session
#[derive(Error, Debug)]
pub enum TlsError {
    /// A required path is missing from the TLS material
    #[error("Incomplete TLS material: {0}")]
    MissingMaterial(String),

    /// A PEM file could not be opened or parsed
    #[error("Failed to read {kind} from {path}: {source}")]
    Pem {
        /// What the file was expected to hold
        kind: PemKind,
        /// Path of the file
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A PEM file parsed but held no item of the expected kind
    #[error("No {kind} found in {path}")]
    EmptyPem {
        /// What the file was expected to hold
        kind: PemKind,
        /// Path of the file
        path: PathBuf,
    },

    /// A CA certificate was rejected by the trust store
    #[error("Invalid CA certificate in {path}: {source}")]
    InvalidCa {
        /// Path of the CA bundle
        path: PathBuf,
        #[source]
        source: rustls::Error,
    },

    /// The mandatory client certificate verifier could not be built
    #[error("Failed to build client certificate verifier: {0}")]
    ClientVerifier(#[from] rustls::server::VerifierBuilderError),

    /// rustls rejected the server configuration (key mismatch, protocol versions)
    #[error("Failed to build TLS server config: {0}")]
    ServerConfig(#[source] rustls::Error),

    /// The handshake with a client failed, including client certificate rejection
    #[error("TLS handshake failed: {0}")]
    Handshake(#[source] io::Error),
}

impl TlsError {
    /// Create a load error for `kind` read from `path`
    pub fn pem(kind: PemKind, path: impl Into<PathBuf>, source: io::Error) -> Self {
        TlsError::Pem {
            kind,
            path: path.into(),
            source,
        }
    }

    /// Create an error for a PEM file with no usable item of `kind`
    pub fn empty_pem(kind: PemKind, path: impl Into<PathBuf>) -> Self {
        TlsError::EmptyPem {
            kind,
            path: path.into(),
        }
    }
}
