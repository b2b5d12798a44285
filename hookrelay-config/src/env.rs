// Environment variable loading

use serde_json::Value;
use std::collections::HashMap;

/// Loads prefixed environment variables as configuration values.
///
/// `HOOKRELAY_EXTERNAL_PORT=9000` becomes the key `external_port` with the
/// JSON number `9000`. Values that do not parse as a JSON scalar are kept as
/// strings.
pub struct EnvLoader {
    prefix: Option<String>,
}

impl EnvLoader {
    /// Create a new environment loader
    pub fn new(prefix: Option<String>) -> Self {
        Self { prefix }
    }

    /// Load from an explicit set of variables
    pub fn load_from<I, K, V>(&self, vars: I) -> HashMap<String, Value>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut config = HashMap::new();

        for (key, value) in vars {
            let key = key.as_ref();
            let name = match &self.prefix {
                Some(prefix) => match key.strip_prefix(prefix.as_str()) {
                    Some(rest) if rest.starts_with('_') => rest.trim_start_matches('_'),
                    _ => continue,
                },
                None => key,
            };
            if name.is_empty() {
                continue;
            }
            config.insert(name.to_lowercase(), parse_scalar(value.as_ref()));
        }

        config
    }
}

impl Default for EnvLoader {
    fn default() -> Self {
        Self::new(None)
    }
}

/// Numbers and booleans become typed values, everything else a string.
pub(crate) fn parse_scalar(raw: &str) -> Value {
    match serde_json::from_str::<Value>(raw) {
        Ok(value @ (Value::Number(_) | Value::Bool(_))) => value,
        _ => Value::String(raw.to_string()),
    }
}
