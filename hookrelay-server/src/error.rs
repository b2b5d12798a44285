// Error types for the relay server

use crate::http::HttpResponse;
use hookrelay_core::{ErrorKind, RegistryError};
use http::StatusCode;
use thiserror::Error;

/// Failure that ends up as an HTTP response.
///
/// The body is `{"message": "..."}`, except for 403 which carries no body.
#[derive(Error, Debug)]
#[error("{status}: {message}")]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn forbidden() -> Self {
        Self::new(StatusCode::FORBIDDEN, String::new())
    }

    pub fn payload_too_large(limit: usize) -> Self {
        Self::new(
            StatusCode::PAYLOAD_TOO_LARGE,
            format!("Request body exceeds {limit} bytes"),
        )
    }

    pub fn bad_gateway(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, message)
    }

    pub fn into_response(self) -> HttpResponse {
        if self.status == StatusCode::FORBIDDEN {
            return HttpResponse::new(self.status);
        }
        let body = serde_json::json!({ "message": self.message });
        HttpResponse::new(self.status).with_json(&body)
    }
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        let status = match err.kind() {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::AlreadyExists | ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
            ErrorKind::TransportFailure => StatusCode::BAD_GATEWAY,
            ErrorKind::CredentialFailure | ErrorKind::StorageFailure => {
                tracing::error!(error = %err, "Registry operation failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self::new(status, err.to_string())
    }
}

/// Errors that stop the server from starting or serving.
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Configuration error: {0}")]
    Config(#[from] hookrelay_config::ConfigError),

    #[error("Logging setup failed: {0}")]
    Log(#[from] hookrelay_log::LogError),

    #[error("Could not open store: {0}")]
    Store(#[from] hookrelay_store::StoreError),

    #[error("Could not load registry: {0}")]
    Registry(#[from] RegistryError),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ServerError>;
