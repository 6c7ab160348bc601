//! Daemon configuration
//!
//! The daemon loads its service roster from a JSON file. Descriptor-level
//! constraints (poll interval range, URL shape) are enforced when the roster
//! is turned into descriptors, not here.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::{ConfigError, ConfigResult};

/// Top-level daemon configuration.
#[derive(Debug, Deserialize)]
pub struct WardenConfig {
    /// Listen address for the persistent UI socket
    #[serde(default)]
    pub ui_listen: Option<String>,
    /// Listen address for the per-request endpoint
    #[serde(default)]
    pub rpc_listen: Option<String>,
    /// Supervised service roster
    #[serde(default)]
    pub services: Vec<ServiceConfig>,
}

/// Roster entry for one supervised service.
#[derive(Debug, Deserialize)]
pub struct ServiceConfig {
    /// Display name, unique within the roster
    pub name: String,
    /// Health-check endpoint
    pub health_check_url: String,
    /// Probe interval override in milliseconds
    #[serde(default)]
    pub poll_interval_ms: Option<u64>,
    /// Command that starts the service
    pub start_command: Vec<String>,
    /// Optional command that stops it; otherwise the child is killed
    #[serde(default)]
    pub stop_command: Option<Vec<String>>,
    /// Start the service as soon as the daemon boots
    #[serde(default = "default_autostart")]
    pub autostart: bool,
}

fn default_autostart() -> bool {
    true
}

impl WardenConfig {
    /// Load and decode a configuration file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let raw = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        let mut seen = std::collections::HashSet::new();
        for service in &config.services {
            if !seen.insert(service.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate service name '{}'",
                    service.name
                )));
            }
        }
        Ok(config)
    }
}
