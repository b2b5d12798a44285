//! Error types for relay transport operations.

use crate::wire::WireError;
use thiserror::Error;

/// Relay transport error type.
#[derive(Error, Debug)]
pub enum WebSocketError {
    /// Protocol error
    #[error("Protocol error: {0}")]
    Protocol(#[from] tungstenite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Connection closed
    #[error("Connection closed")]
    ConnectionClosed,

    /// The connection set was shut down and takes no new connections
    #[error("Connection set is closed")]
    SetClosed,

    /// Send timed out
    #[error("Operation timed out")]
    Timeout,

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Header value could not be built
    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    /// Frame payload was not a serialized request
    #[error("Wire format error: {0}")]
    Wire(#[from] WireError),
}

/// Result type for relay transport operations.
pub type WebSocketResult<T> = Result<T, WebSocketError>;
