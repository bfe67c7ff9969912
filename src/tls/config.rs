//! TLS material configuration

use serde::Deserialize;
use std::path::PathBuf;

/// Paths to the PEM material the proxy terminates client TLS with
///
/// # Example YAML
/// ```yaml
/// server:
///   tls:
///     cert_path: "/path/to/server.crt"
///     key_path: "/path/to/server.key"
///     ca_path: "/path/to/client-ca.crt"
/// ```
#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
pub struct TlsMaterial {
    /// Server certificate chain presented to clients
    pub cert_path: Option<PathBuf>,

    /// Private key matching the server certificate
    pub key_path: Option<PathBuf>,

    /// CA bundle client certificates must chain to
    pub ca_path: Option<PathBuf>,
}

impl TlsMaterial {
    /// Create material from the three required paths
    pub fn new(
        cert_path: impl Into<PathBuf>,
        key_path: impl Into<PathBuf>,
        ca_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            cert_path: Some(cert_path.into()),
            key_path: Some(key_path.into()),
            ca_path: Some(ca_path.into()),
        }
    }

    /// Validate that all paths are present
    ///
    /// TLS cannot be disabled: the proxy only accepts SSLRequest sessions,
    /// so all three paths are mandatory.
    pub fn validate(&self) -> Result<(), String> {
        if self.cert_path.is_none() {
            return Err("cert_path not specified".to_string());
        }
        if self.key_path.is_none() {
            return Err("key_path not specified".to_string());
        }
        if self.ca_path.is_none() {
            return Err("ca_path not specified (client certificates are mandatory)".to_string());
        }
        Ok(())
    }
}
