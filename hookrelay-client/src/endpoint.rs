//! Where a connector talks to.

use crate::error::{ConnectorError, Result};
use hookrelay_core::paths;
use std::fmt;

const DEFAULT_TLS_PORT: u16 = 443;
const DEFAULT_PORT: u16 = 80;

/// Host, port and scheme of a relay server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub tls: bool,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16, tls: bool) -> Self {
        Self {
            host: host.into(),
            port,
            tls,
        }
    }

    /// Secure endpoint named by a redirect `Location`.
    ///
    /// Only the host and port are taken; the scheme is always upgraded to
    /// TLS and the path is replaced by the connect path.
    pub fn from_location(location: &str) -> Result<Self> {
        let uri: http::Uri = location
            .parse()
            .map_err(|_| ConnectorError::InvalidLocation(location.to_string()))?;
        let host = uri
            .host()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| ConnectorError::InvalidLocation(location.to_string()))?;

        Ok(Self::new(
            host.trim_start_matches('[').trim_end_matches(']'),
            uri.port_u16().unwrap_or(DEFAULT_TLS_PORT),
            true,
        ))
    }

    fn host_for_url(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        }
    }

    fn authority(&self) -> String {
        let default = if self.tls { DEFAULT_TLS_PORT } else { DEFAULT_PORT };
        if self.port == default {
            self.host_for_url()
        } else {
            format!("{}:{}", self.host_for_url(), self.port)
        }
    }

    /// `ws(s)://host:port/v1/connect`
    pub fn connect_url(&self) -> String {
        let scheme = if self.tls { "wss" } else { "ws" };
        format!("{}://{}{}", scheme, self.authority(), paths::CONNECT)
    }

    /// `http(s)://host:port<path>`
    pub fn http_url(&self, path: &str) -> String {
        let scheme = if self.tls { "https" } else { "http" };
        format!("{}://{}{}", scheme, self.authority(), path)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.http_url(""))
    }
}
