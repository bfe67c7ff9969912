//! pg-tls-proxy - TLS-terminating PostgreSQL proxy
//!
//! Loads a YAML configuration, terminates client TLS (client certificates
//! required) and relays decrypted traffic to the configured backend.

use clap::Parser;
use std::path::PathBuf;
use tokio::signal;
use tracing::{debug, info, warn};

use pg_tls_proxy::{config, Proxy, ProxyError, Result, SessionHooks, TlsSessionState};

#[derive(Parser)]
#[command(name = "pg-tls-proxy")]
#[command(version)]
#[command(about = "TLS-terminating proxy for the PostgreSQL wire protocol")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: PathBuf,

    /// Override listen address
    #[arg(long)]
    listen_address: Option<String>,

    /// Override listen port
    #[arg(long)]
    listen_port: Option<u16>,

    /// Enable verbose/debug logging
    #[arg(short, long)]
    verbose: bool,
}

/// Error sink and session logging for the standalone binary
struct LoggingHooks;

impl SessionHooks for LoggingHooks {
    fn on_client_state(
        &self,
        state: &TlsSessionState,
    ) -> std::result::Result<(), pg_tls_proxy::HookError> {
        debug!(
            "Client authenticated over {} ({}), {} certificate(s)",
            state.protocol_name().unwrap_or("unknown"),
            state.cipher_suite_name().unwrap_or("unknown"),
            state.peer_certificates.len()
        );
        Ok(())
    }

    fn on_error(&self, err: &ProxyError) {
        if err.is_not_ssl_request() {
            info!("Rejected client: {}", err);
        } else {
            warn!("{}", err);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = config::load_config(&cli.config)?;

    // Priority: --verbose flag, then RUST_LOG env var, then config level
    let log_level = if cli.verbose {
        "debug".to_string()
    } else {
        std::env::var("RUST_LOG").unwrap_or_else(|_| config.logging.level.clone())
    };
    tracing_subscriber::fmt().with_env_filter(&log_level).init();

    info!("Starting pg-tls-proxy v{}", env!("CARGO_PKG_VERSION"));
    info!("Loaded configuration from {:?}", cli.config);

    if let Some(addr) = cli.listen_address {
        config.server.listen_address = addr;
    }
    if let Some(port) = cli.listen_port {
        config.server.listen_port = port;
    }

    let proxy = Proxy::from_material(config.proxy_config(), config.tls_material())?
        .with_hooks(LoggingHooks);

    tokio::select! {
        result = proxy.serve() => result?,
        result = shutdown_signal() => {
            result?;
            info!("Shutdown signal received, stopping proxy");
        }
    }

    Ok(())
}

/// Resolve on Ctrl+C or SIGTERM
async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;
        tokio::select! {
            result = signal::ctrl_c() => result?,
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        signal::ctrl_c().await?;
    }
    Ok(())
}
