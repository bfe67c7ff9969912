//! Configuration loader

use std::path::{Path, PathBuf};

use super::Config;
use crate::error::{ProxyError, Result};

/// Load configuration from a YAML file
///
/// Also applies PG_TLS_PROXY_* env var overrides after loading.
pub fn load_config(path: &Path) -> Result<Config> {
    let contents = std::fs::read_to_string(path)?;
    load_config_from_str(&contents)
}

/// Load configuration from a YAML string (useful for testing)
///
/// Also applies PG_TLS_PROXY_* env var overrides after loading.
pub fn load_config_from_str(yaml: &str) -> Result<Config> {
    let mut config: Config = serde_yaml::from_str(yaml)?;
    resolve_config_env_vars(&mut config, |name| std::env::var(name).ok());
    apply_env_overrides(&mut config);
    config.validate().map_err(ProxyError::Config)?;
    Ok(config)
}

/// Apply PG_TLS_PROXY_* environment variable overrides to a config.
///
/// Supported env vars:
/// - `PG_TLS_PROXY_LISTEN_ADDRESS` - Override listen address
/// - `PG_TLS_PROXY_LISTEN_PORT` - Override listen port
/// - `PG_TLS_PROXY_BACKEND_HOST` - Override backend host
/// - `PG_TLS_PROXY_BACKEND_PORT` - Override backend port
/// - `PG_TLS_PROXY_LOG_LEVEL` - Override log level
/// - `PG_TLS_PROXY_HANDSHAKE_TIMEOUT_SECS` - Override handshake timeout
/// - `PG_TLS_PROXY_IDLE_TIMEOUT_SECS` - Override idle timeout
///
/// Values that fail to parse are ignored.
pub fn apply_env_overrides(config: &mut Config) {
    apply_overrides_from(config, |name| std::env::var(name).ok());
}

/// Apply overrides looked up through `lookup` instead of the process
/// environment
pub fn apply_overrides_from<F>(config: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(val) = lookup("PG_TLS_PROXY_LISTEN_ADDRESS") {
        debug!("Overriding listen_address from PG_TLS_PROXY_LISTEN_ADDRESS");
        config.server.listen_address = val;
    }
    if let Some(port) = parse_var::<u16, _>(&lookup, "PG_TLS_PROXY_LISTEN_PORT") {
        debug!("Overriding listen_port from PG_TLS_PROXY_LISTEN_PORT");
        config.server.listen_port = port;
    }
    if let Some(val) = lookup("PG_TLS_PROXY_BACKEND_HOST") {
        debug!("Overriding backend host from PG_TLS_PROXY_BACKEND_HOST");
        config.backend.host = val;
    }
    if let Some(port) = parse_var::<u16, _>(&lookup, "PG_TLS_PROXY_BACKEND_PORT") {
        debug!("Overriding backend port from PG_TLS_PROXY_BACKEND_PORT");
        config.backend.port = port;
    }
    if let Some(val) = lookup("PG_TLS_PROXY_LOG_LEVEL") {
        debug!("Overriding log level from PG_TLS_PROXY_LOG_LEVEL");
        config.logging.level = val;
    }
    if let Some(secs) = parse_var::<u64, _>(&lookup, "PG_TLS_PROXY_HANDSHAKE_TIMEOUT_SECS") {
        debug!("Overriding handshake_timeout from PG_TLS_PROXY_HANDSHAKE_TIMEOUT_SECS");
        config.server.handshake_timeout_secs = secs;
    }
    if let Some(secs) = parse_var::<u64, _>(&lookup, "PG_TLS_PROXY_IDLE_TIMEOUT_SECS") {
        debug!("Overriding idle_timeout from PG_TLS_PROXY_IDLE_TIMEOUT_SECS");
        config.server.idle_timeout_secs = secs;
    }
}

fn parse_var<T, F>(lookup: &F, name: &str) -> Option<T>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(name).and_then(|val| val.parse().ok())
}

/// Resolve an environment variable reference in a string value
///
/// Supports two syntaxes:
/// - `${VAR_NAME}` - curly brace syntax
/// - `$VAR_NAME` - simple syntax (for single variable values)
///
/// If the environment variable is not set, the original value is preserved.
fn resolve_env_var<F>(value: &str, lookup: &F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let var_name = if value.starts_with("${") && value.ends_with('}') {
        &value[2..value.len() - 1]
    } else if value.starts_with('$') && !value.contains(' ') && value.len() > 1 {
        &value[1..]
    } else {
        return value.to_string();
    };

    match lookup(var_name) {
        Some(env_value) => {
            debug!("Resolved env var {} from config", var_name);
            env_value
        }
        None => {
            debug!("Env var {} not set, keeping original value", var_name);
            value.to_string()
        }
    }
}

fn resolve_path<F>(path: &mut Option<PathBuf>, lookup: &F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(current) = path.as_ref().and_then(|p| p.to_str()) {
        let resolved = resolve_env_var(current, lookup);
        *path = Some(PathBuf::from(resolved));
    }
}

/// Resolve environment variables in the config fields that support it
fn resolve_config_env_vars<F>(config: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    config.backend.host = resolve_env_var(&config.backend.host, &lookup);
    resolve_path(&mut config.server.tls.cert_path, &lookup);
    resolve_path(&mut config.server.tls.key_path, &lookup);
    resolve_path(&mut config.server.tls.ca_path, &lookup);
}
