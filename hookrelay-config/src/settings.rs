//! Typed server settings

use crate::validation::{ConfigValidator, Validate};
use crate::{ConfigManager, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable prefix for settings overrides
pub const ENV_PREFIX: &str = "HOOKRELAY";

/// Config file name looked up in the default locations
pub const CONFIG_FILE_NAME: &str = "server.toml";

/// Default cap on request bodies: 8 MiB.
pub const DEFAULT_MAX_BODY_BYTES: usize = 8 * 1024 * 1024;

/// Highest accepted `max_body_bytes`. A relayed request travels as one
/// websocket frame of at most 16 MiB, and its request line and headers need
/// room next to the body.
pub const MAX_BODY_BYTES_LIMIT: usize = 15 * 1024 * 1024;

/// Settings of the relay server process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Address the external listeners bind to
    pub host: String,
    /// Host name written into hook URLs; falls back to `host`
    pub advertised_host: Option<String>,
    pub external_port: u16,
    pub external_ssl_port: u16,
    /// Loopback-only admin port
    pub internal_port: u16,
    pub ssl_certificate: Option<PathBuf>,
    pub ssl_key: Option<PathBuf>,
    pub database_path: PathBuf,
    pub debug: bool,
    pub log_level: String,
    pub log_format: String,
    /// Upper bound for one frame send to one connection
    pub send_timeout_ms: u64,
    /// Outgoing frame queue per connection
    pub connection_queue: usize,
    /// Largest request body read on any listener
    pub max_body_bytes: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            advertised_host: None,
            external_port: 12840,
            external_ssl_port: 12842,
            internal_port: 12841,
            ssl_certificate: None,
            ssl_key: None,
            database_path: default_database_path(),
            debug: false,
            log_level: "warn".to_string(),
            log_format: "plain".to_string(),
            send_timeout_ms: 5000,
            connection_queue: 64,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

#[cfg(windows)]
fn default_database_path() -> PathBuf {
    PathBuf::from("./hooks.db")
}

#[cfg(not(windows))]
fn default_database_path() -> PathBuf {
    PathBuf::from("/var/lib/hookrelay/hooks.db")
}

impl ServerSettings {
    /// Load settings: defaults, then the config file, then `.env`, then
    /// `HOOKRELAY_*` variables.
    ///
    /// With an explicit `path` the file must exist. Without one the first
    /// file found in [`ServerSettings::search_paths`] is used, if any.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let manager = ConfigManager::with_prefix(ENV_PREFIX.to_string());

        match path {
            Some(path) => manager.load_file_auto(path)?,
            None => {
                if let Some(found) = Self::search_paths().into_iter().find(|p| p.is_file()) {
                    manager.load_file_auto(&found)?;
                }
            }
        }

        manager.load_dotenv(None)?;
        manager.load_validated()
    }

    /// Default config file locations, in lookup order
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("/etc/hookrelay").join(CONFIG_FILE_NAME)];
        if let Ok(home) = std::env::var("HOME") {
            paths.push(PathBuf::from(home).join(".hookrelay").join(CONFIG_FILE_NAME));
        }
        paths.push(PathBuf::from(".").join(CONFIG_FILE_NAME));
        paths
    }

    /// TLS is on when both certificate and key are configured
    pub fn tls_configured(&self) -> bool {
        self.ssl_certificate.is_some() && self.ssl_key.is_some()
    }

    pub fn advertised_host(&self) -> &str {
        self.advertised_host.as_deref().unwrap_or(&self.host)
    }

    /// Scheme and port used in public hook URLs
    pub fn public_scheme_and_port(&self) -> (&'static str, u16) {
        if self.tls_configured() {
            ("https", self.external_ssl_port)
        } else {
            ("http", self.external_port)
        }
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }
}

impl Validate for ServerSettings {
    fn validate(&self) -> Result<()> {
        ConfigValidator::not_empty(&self.host, "host")?;
        if let Some(advertised) = &self.advertised_host {
            ConfigValidator::not_empty(advertised, "advertised_host")?;
        }
        ConfigValidator::is_port(self.external_port, "external_port")?;
        ConfigValidator::is_port(self.external_ssl_port, "external_ssl_port")?;
        ConfigValidator::is_port(self.internal_port, "internal_port")?;
        ConfigValidator::distinct_ports(&[
            ("external_port", self.external_port),
            ("external_ssl_port", self.external_ssl_port),
            ("internal_port", self.internal_port),
        ])?;

        if self.ssl_certificate.is_some() != self.ssl_key.is_some() {
            return Err(crate::ConfigError::ValidationError(
                "ssl_certificate and ssl_key must be set together".to_string(),
            ));
        }

        ConfigValidator::one_of(
            &self.log_level,
            &["trace", "debug", "info", "warn", "warning", "error"],
            "log_level",
        )?;
        ConfigValidator::one_of(&self.log_format, &["json", "plain", "text", "compact"], "log_format")?;
        ConfigValidator::at_least(self.send_timeout_ms, 1, "send_timeout_ms")?;
        ConfigValidator::at_least(self.connection_queue, 1, "connection_queue")?;
        ConfigValidator::at_least(self.max_body_bytes, 1, "max_body_bytes")?;
        ConfigValidator::at_most(self.max_body_bytes, MAX_BODY_BYTES_LIMIT, "max_body_bytes")?;
        Ok(())
    }
}
