//! Error types for the HookRelay CLI.

use thiserror::Error;

/// Result type for CLI operations.
pub type CliResult<T> = Result<T, CliError>;

/// CLI error types.
#[derive(Error, Debug)]
pub enum CliError {
    /// The server answered with a non-2xx status
    #[error("{}", server_message(.status, .message))]
    Server { status: u16, message: Option<String> },

    /// Transport failure talking to the server
    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server sent something we could not read
    #[error("Unexpected response: {0}")]
    InvalidResponse(String),
}

fn server_message(status: &u16, message: &Option<String>) -> String {
    match message {
        Some(message) => message.clone(),
        None => format!("Server responded with {}", status),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_error_display() {
        let err = CliError::Server {
            status: 400,
            message: Some("A client with the name 'acme' already exists".to_string()),
        };
        assert_eq!(err.to_string(), "A client with the name 'acme' already exists");

        let err = CliError::Server {
            status: 502,
            message: None,
        };
        assert_eq!(err.to_string(), "Server responded with 502");
    }
}
