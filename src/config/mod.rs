//! Typed configuration from environment variables or TOML.
//!
//! The only setting with an effect on the data structures is the
//! initial-capacity hint, and it only saves reallocations. The rest feeds
//! telemetry setup.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::Path;

const CAPACITY_VAR: &str = "FLIGHTMAP_INITIAL_CAPACITY";
const OTEL_ENDPOINT_VAR: &str = "OTEL_ENDPOINT";
const LOG_LEVEL_VAR: &str = "LOG_LEVEL";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Number of entries to preallocate in the backing map.
    pub initial_capacity: usize,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            initial_capacity: 0,
            otel_endpoint: None,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load a `.env` file if present, then read the environment.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_env()
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_vars<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let initial_capacity = match lookup(CAPACITY_VAR) {
            Some(raw) => raw.trim().parse::<usize>().map_err(|e| {
                Error::Config(format!(
                    "{CAPACITY_VAR} must be a non-negative integer, got {raw:?}: {e}"
                ))
            })?,
            None => defaults.initial_capacity,
        };

        Ok(Self {
            initial_capacity,
            otel_endpoint: lookup(OTEL_ENDPOINT_VAR).filter(|v| !v.is_empty()),
            log_level: lookup(LOG_LEVEL_VAR).unwrap_or(defaults.log_level),
        })
    }

    /// Parse configuration from a TOML document. Missing keys take defaults.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("bad config: {e}")))
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read config {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }
}
