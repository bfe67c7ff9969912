//! Configuration types

use serde::Deserialize;
use std::time::Duration;

use crate::proxy::ProxyConfig;
use crate::tls::TlsMaterial;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Listener configuration
    pub server: ServerConfig,

    /// Backend to forward decrypted traffic to
    pub backend: BackendConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.server.listen_port == 0 {
            return Err("server.listen_port must be non-zero".to_string());
        }
        if self.backend.host.is_empty() {
            return Err("backend.host must not be empty".to_string());
        }
        if self.backend.port == 0 {
            return Err("backend.port must be non-zero".to_string());
        }
        self.server
            .tls
            .validate()
            .map_err(|e| format!("server.tls: {}", e))
    }

    /// `host:port` the proxy listens on
    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.server.listen_address, self.server.listen_port)
    }

    /// `host:port` of the backend
    pub fn backend_address(&self) -> String {
        format!("{}:{}", self.backend.host, self.backend.port)
    }

    /// Addresses and timeouts for [`Proxy`](crate::Proxy)
    pub fn proxy_config(&self) -> ProxyConfig {
        ProxyConfig::new(self.listen_address(), self.backend_address())
            .with_handshake_timeout(secs_to_timeout(self.server.handshake_timeout_secs))
            .with_idle_timeout(secs_to_timeout(self.server.idle_timeout_secs))
    }

    /// TLS material for the acceptor
    pub fn tls_material(&self) -> &TlsMaterial {
        &self.server.tls
    }
}

/// Server listener configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address to listen on
    #[serde(default = "default_listen_address")]
    pub listen_address: String,
    /// Port to listen on
    pub listen_port: u16,
    /// SSL negotiation + TLS handshake timeout in seconds (0 = disabled)
    #[serde(default)]
    pub handshake_timeout_secs: u64,
    /// Relay idle timeout in seconds (0 = disabled)
    #[serde(default)]
    pub idle_timeout_secs: u64,
    /// TLS material for accepting client connections
    #[serde(default)]
    pub tls: TlsMaterial,
}

/// Backend database configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    /// Backend host
    pub host: String,
    /// Backend port
    #[serde(default = "default_backend_port")]
    pub port: u16,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn secs_to_timeout(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

fn default_listen_address() -> String {
    "127.0.0.1".to_string()
}

fn default_backend_port() -> u16 {
    5432
}

fn default_log_level() -> String {
    "info".to_string()
}
