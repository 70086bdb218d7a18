//! Configuration file resolution and loading
//!
//! Configuration file lookup follows this priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. Per-user config directory (`~/.config/<app>/config.toml` on Linux)
//! 4. System-wide `/etc/<app>/config.toml` (Unix only)
//!
//! An explicitly requested file (1 or 2) must exist. When no file is found
//! through 3 or 4 the caller falls back to built-in defaults.

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::debug;

/// File name looked up inside configuration directories
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Locate the configuration file for `app_name`
///
/// Returns `Ok(None)` when no explicit file was requested and none of the
/// default locations holds one.
pub fn resolve_config_file(
    cli_arg: Option<&Path>,
    env_var_name: &str,
    app_name: &str,
) -> Result<Option<PathBuf>> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return require_existing(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.is_empty() {
            return require_existing(PathBuf::from(path));
        }
    }

    // Priority 3 and 4: default locations
    for candidate in default_locations(app_name) {
        if candidate.exists() {
            debug!("Using configuration file {}", candidate.display());
            return Ok(Some(candidate));
        }
    }

    debug!("No configuration file found for {}", app_name);
    Ok(None)
}

/// Parse a TOML file into `T`
pub fn load_toml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)?;
    parse_toml(&content)
        .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
}

/// Parse TOML text into `T`
pub fn parse_toml<T: DeserializeOwned>(content: &str) -> Result<T> {
    toml::from_str(content).map_err(|e| Error::Config(e.to_string()))
}

fn require_existing(path: PathBuf) -> Result<Option<PathBuf>> {
    if path.exists() {
        Ok(Some(path))
    } else {
        Err(Error::Config(format!(
            "Config file not found: {}",
            path.display()
        )))
    }
}

/// Default configuration file locations, most specific first
fn default_locations(app_name: &str) -> Vec<PathBuf> {
    let mut locations = Vec::new();

    if let Some(dir) = dirs::config_dir() {
        locations.push(dir.join(app_name).join(CONFIG_FILE_NAME));
    }

    if cfg!(unix) {
        locations.push(PathBuf::from("/etc").join(app_name).join(CONFIG_FILE_NAME));
    }

    locations
}
