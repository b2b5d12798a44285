//! Connector errors.

use hookrelay_websocket::WebSocketError;
use thiserror::Error;

/// Result type for connector operations.
pub type Result<T> = std::result::Result<T, ConnectorError>;

/// Errors raised by the connector.
#[derive(Error, Debug)]
pub enum ConnectorError {
    /// The server refused the upgrade (bad secret, unknown client, ...)
    #[error("could not connect: server responded with {status}")]
    CouldNotConnect { status: u16 },

    /// A redirect pointed somewhere we cannot dial
    #[error("invalid redirect location '{0}'")]
    InvalidLocation(String),

    /// The redirect chain exceeded the configured cap
    #[error("too many redirects (limit {0})")]
    TooManyRedirects(usize),

    /// `connect` was called while a connection is live
    #[error("already connected")]
    AlreadyConnected,

    /// Self-service call before any endpoint was resolved
    #[error("not connected")]
    NotConnected,

    /// A self-service call got an unexpected status
    #[error("unknown server error: status {status}")]
    UnknownServerError { status: u16 },

    /// TLS setup failed
    #[error("TLS configuration error: {0}")]
    Tls(String),

    /// Websocket transport failure
    #[error(transparent)]
    Transport(#[from] WebSocketError),

    /// HTTP failure on a self-service call
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}
