//! Environment variable parsing helpers
//!
//! Provides ergonomic helpers for reading configuration from environment variables.

use anyhow::{Context, Result};
use std::env;
use std::str::FromStr;

/// Extension trait for parsing environment variables.
///
/// Provides convenient methods for reading env vars with defaults, required values,
/// and type parsing.
pub trait ConfigExt {
    /// Get an environment variable with a default value.
    ///
    /// # Example
    /// ```ignore
    /// let master = String::env_or("MYSQL_MASTER_CONTAINER", "master");
    /// ```
    fn env_or(name: &str, default: &str) -> String {
        env::var(name).unwrap_or_else(|_| default.to_string())
    }

    /// Get a required environment variable.
    ///
    /// Unset and empty values are both errors.
    ///
    /// # Example
    /// ```ignore
    /// let password = String::env_required("MYSQL_ROOT_PASSWORD")?;
    /// ```
    fn env_required(name: &str) -> Result<String> {
        let value = env::var(name).context(format!("{} must be set", name))?;
        if value.is_empty() {
            anyhow::bail!("{} must not be empty", name);
        }
        Ok(value)
    }

    /// Get an environment variable parsed as a specific type.
    ///
    /// Returns `default` if the variable is not set or fails to parse.
    ///
    /// # Example
    /// ```ignore
    /// let port: u16 = u16::env_parse("MYSQL_MASTER_PORT", 3306);
    /// ```
    fn env_parse<T: FromStr>(name: &str, default: T) -> T {
        env::var(name)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    /// Get a comma-separated list, falling back to `default` when unset.
    ///
    /// Entries are trimmed and empty entries are dropped.
    ///
    /// # Example
    /// ```ignore
    /// let slaves = String::env_list("MYSQL_SLAVE_CONTAINERS", "slave1,slave2");
    /// ```
    fn env_list(name: &str, default: &str) -> Vec<String> {
        split_list(&Self::env_or(name, default))
    }
}

// Blanket implementation for all types
impl<T> ConfigExt for T {}

/// Split "a, b,,c" into ["a", "b", "c"].
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
