//! TOML-based configuration.
//!
//! Supports a config file (granary.toml) with environment variable
//! expansion.
//!
//! Example configuration:
//! ```toml
//! [warehouses.census]
//! dsn = "sqlite:///var/lib/granary/census.db"
//!
//! [warehouses.production]
//! dsn = "${PROD_WAREHOUSE_DSN}"
//! registry = "/var/lib/granary/production-registry.db"
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Error type for settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Warehouse not found: {0}")]
    WarehouseNotFound(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Named warehouses.
    #[serde(default)]
    pub warehouses: HashMap<String, WarehouseSettings>,
}

/// One warehouse's configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WarehouseSettings {
    /// Warehouse DSN (supports ${ENV_VAR} expansion).
    pub dsn: String,

    /// Registry database path; defaults to the shared registry location.
    #[serde(default)]
    pub registry: Option<String>,
}

impl WarehouseSettings {
    /// Get the DSN with environment variables expanded.
    pub fn resolved_dsn(&self) -> Result<String, SettingsError> {
        expand_env_vars(&self.dsn)
    }
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        if !path.exists() {
            return Err(SettingsError::FileNotFound(path.to_path_buf()));
        }
        let text = fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }

    /// Look up a named warehouse.
    pub fn warehouse(&self, name: &str) -> Result<&WarehouseSettings, SettingsError> {
        self.warehouses
            .get(name)
            .ok_or_else(|| SettingsError::WarehouseNotFound(name.to_string()))
    }
}

/// Expand `${VAR}` references against the process environment.
fn expand_env_vars(input: &str) -> Result<String, SettingsError> {
    let mut result = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        result.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            result.push_str(&rest[start..]);
            return Ok(result);
        };
        let var = &after[..end];
        let value =
            env::var(var).map_err(|_| SettingsError::MissingEnvVar(var.to_string()))?;
        result.push_str(&value);
        rest = &after[end + 1..];
    }

    result.push_str(rest);
    Ok(result)
}
