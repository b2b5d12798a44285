//! Configuration management for HookRelay
//!
//! [`ConfigManager`] is a flat key/value map fed from config files, `.env`
//! files and prefixed environment variables, later sources overriding
//! earlier ones. [`ServerSettings`] is the typed view the server runs with.

pub mod env;
pub mod error;
pub mod loader;
pub mod settings;
pub mod validation;

pub use env::EnvLoader;
pub use error::{ConfigError, Result};
pub use loader::{ConfigLoader, FileFormat};
pub use settings::{DEFAULT_MAX_BODY_BYTES, MAX_BODY_BYTES_LIMIT, ServerSettings};
pub use validation::{ConfigValidator, Validate};

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Main configuration manager
#[derive(Clone, Default)]
pub struct ConfigManager {
    config: Arc<RwLock<HashMap<String, Value>>>,
    env_prefix: Option<String>,
}

impl ConfigManager {
    /// Create a new configuration manager
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with environment variable prefix
    pub fn with_prefix(prefix: String) -> Self {
        Self {
            config: Arc::new(RwLock::new(HashMap::new())),
            env_prefix: Some(prefix),
        }
    }

    /// Load configuration from environment variables
    pub fn load_env(&self) {
        self.load_env_from(std::env::vars());
    }

    /// Load configuration from an explicit set of variables
    pub fn load_env_from<I, K, V>(&self, vars: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let loader = EnvLoader::new(self.env_prefix.clone());
        self.extend(loader.load_from(vars));
    }

    /// Load a `.env` file into the process environment, then the environment
    pub fn load_dotenv(&self, path: Option<&Path>) -> Result<()> {
        if let Some(path) = path {
            dotenvy::from_path(path).map_err(|e| ConfigError::Dotenv(e.to_string()))?;
        } else {
            dotenvy::dotenv().ok();
        }
        self.load_env();
        Ok(())
    }

    /// Load a file, picking the format from its extension
    pub fn load_file_auto(&self, path: &Path) -> Result<()> {
        let data = ConfigLoader::auto(path)?.load_file(path)?;
        self.extend(data);
        Ok(())
    }

    fn extend(&self, values: impl IntoIterator<Item = (String, Value)>) {
        self.config.write().extend(values);
    }

    /// Deserialize everything into `T` and validate it
    pub fn load_validated<T: DeserializeOwned + Validate>(&self) -> Result<T> {
        let json_value = Value::Object(
            self.config
                .read()
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        );

        let validated: T = serde_json::from_value(json_value)
            .map_err(|e| ConfigError::DeserializationError(e.to_string()))?;

        validated.validate()?;

        Ok(validated)
    }
}
