// Configuration validation

use crate::{ConfigError, Result};

/// Trait for validating configuration
pub trait Validate {
    fn validate(&self) -> Result<()>;
}

/// Reusable validation rules
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate that a value is not empty
    pub fn not_empty(value: &str, field: &str) -> Result<()> {
        if value.trim().is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "{} cannot be empty",
                field
            )));
        }
        Ok(())
    }

    /// Validate that a number is at least `min`
    pub fn at_least<T: PartialOrd + std::fmt::Display>(value: T, min: T, field: &str) -> Result<()> {
        if value < min {
            return Err(ConfigError::ValidationError(format!(
                "{} must be at least {}",
                field, min
            )));
        }
        Ok(())
    }

    /// Validate that a number is at most `max`
    pub fn at_most<T: PartialOrd + std::fmt::Display>(value: T, max: T, field: &str) -> Result<()> {
        if value > max {
            return Err(ConfigError::ValidationError(format!(
                "{} must be at most {}",
                field, max
            )));
        }
        Ok(())
    }

    /// Validate that a value is in a list of allowed values
    pub fn one_of(value: &str, allowed: &[&str], field: &str) -> Result<()> {
        if !allowed.contains(&value.to_lowercase().as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "{} must be one of: {}",
                field,
                allowed.join(", ")
            )));
        }
        Ok(())
    }

    /// Validate port number
    pub fn is_port(value: u16, field: &str) -> Result<()> {
        if value == 0 {
            return Err(ConfigError::ValidationError(format!(
                "{} must be a valid port number",
                field
            )));
        }
        Ok(())
    }

    /// Validate that no two named ports collide
    pub fn distinct_ports(ports: &[(&str, u16)]) -> Result<()> {
        for (i, (a_name, a)) in ports.iter().enumerate() {
            for (b_name, b) in &ports[i + 1..] {
                if a == b {
                    return Err(ConfigError::ValidationError(format!(
                        "{} and {} must differ (both {})",
                        a_name, b_name, a
                    )));
                }
            }
        }
        Ok(())
    }
}
