// Errors raised while loading server settings

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unsupported config file extension: {0}")]
    UnsupportedFormat(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Top level of {} must be a table", .0.display())]
    NotATable(PathBuf),

    #[error("Failed to load .env file: {0}")]
    Dotenv(String),

    #[error("Invalid setting: {0}")]
    ValidationError(String),

    #[error("Setting has the wrong type: {0}")]
    DeserializationError(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_file() {
        let err = ConfigError::FileNotFound(PathBuf::from("/etc/hookrelay/server.toml"));
        assert_eq!(
            err.to_string(),
            "Config file not found: /etc/hookrelay/server.toml"
        );

        let err = ConfigError::NotATable(PathBuf::from("server.json"));
        assert_eq!(err.to_string(), "Top level of server.json must be a table");
    }
}
