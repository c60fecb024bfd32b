//! Configuration loading and schema definitions for suitest.
//!
//! This module provides types and functions for loading suitest configuration
//! from TOML files or strings. Every section is optional; a missing file
//! yields the built-in defaults.

pub mod schema;

pub use schema::*;

use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

/// Loads suitest configuration from a TOML file.
///
/// # Errors
///
/// Returns an error if:
/// - The file cannot be read (e.g., doesn't exist or permission denied)
/// - The file contains invalid TOML syntax
/// - The configuration doesn't match the expected schema
///
/// # Example
///
/// ```no_run
/// use suitest::config::load_config;
/// use std::path::Path;
///
/// let config = load_config(Path::new("suitest.toml"))?;
/// println!("Default timeout: {}ms", config.suitest.default_timeout_ms);
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

    Ok(config)
}

/// Loads suitest configuration from a TOML string.
///
/// # Example
///
/// ```
/// use suitest::config::load_config_str;
///
/// let config = load_config_str(r#"
///     [suitest]
///     default_timeout_ms = 250
///     max_workers = 4
/// "#)?;
///
/// assert_eq!(config.suitest.default_timeout_ms, 250);
/// assert_eq!(config.suitest.max_workers, Some(4));
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn load_config_str(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).context("Failed to parse config")?;

    Ok(config)
}

/// Loads the configuration at `path`, falling back to defaults when the
/// file does not exist.
///
/// A file that exists but fails to parse is still an error.
pub fn load_config_or_default(path: &Path) -> Result<Config> {
    if !path.exists() {
        debug!(
            "No config file at {}, using defaults",
            path.display()
        );
        return Ok(Config::default());
    }
    load_config(path)
}
