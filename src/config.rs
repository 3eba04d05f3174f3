// Copyright 2025 Chris Custine
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Application configuration management.
//!
//! This module handles persistent configuration storage using TOML format.
//! It holds the configured servers, the user's display and alert
//! preferences, and the tunables for duplicate detection and polling.

use std::time::Duration;

use acars_state::prefs::Preferences;
use acars_state::stream::DEFAULT_ADDRESS;
use acars_state::ReconcilerConfig;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const APP_NAME: &str = "acars-monitor";
const CONFIG_NAME: &str = "config";

/// Server configuration for a single dashboard connection
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Unique identifier for this server (stable across renames)
    pub id: String,

    /// User-friendly display name
    pub name: String,

    /// Server address in host:port format
    pub address: String,

    /// Whether this server should auto-connect on startup
    pub enabled: bool,
}

impl ServerConfig {
    /// Create a new server configuration with a generated UUID
    pub fn new(name: String, address: String, enabled: bool) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name,
            address,
            enabled,
        }
    }

    /// Create the default local server
    pub fn default_local() -> Self {
        Self::new(
            "Default Local Server".to_string(),
            DEFAULT_ADDRESS.to_string(),
            true,
        )
    }
}

/// Application configuration stored in TOML format
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AppConfig {
    /// Configuration schema version for migrations
    #[serde(default = "default_config_version")]
    pub config_version: u32,

    /// List of configured servers; the first enabled one is used
    #[serde(default = "default_servers")]
    pub servers: Vec<ServerConfig>,

    /// Display, cap and alert notification preferences
    #[serde(default)]
    pub preferences: Preferences,

    /// Two deliveries of the same message further apart than this are kept apart
    #[serde(default = "default_duplicate_window_secs")]
    pub duplicate_window_secs: f64,

    /// Characters of message text compared for duplicate detection
    #[serde(default = "default_duplicate_prefix_len")]
    pub duplicate_prefix_len: usize,

    /// Seconds between statistics refreshes while polling is on
    #[serde(default = "default_stats_poll_secs")]
    pub stats_poll_secs: u64,

    /// Seconds to wait before reconnecting
    #[serde(default = "default_reconnect_delay_secs")]
    pub reconnect_delay_secs: u64,
}

// Default value functions for serde
fn default_config_version() -> u32 {
    1 // Current schema version
}

fn default_servers() -> Vec<ServerConfig> {
    vec![ServerConfig::default_local()]
}

fn default_duplicate_window_secs() -> f64 {
    120.0
}

fn default_duplicate_prefix_len() -> usize {
    64
}

fn default_stats_poll_secs() -> u64 {
    30
}

fn default_reconnect_delay_secs() -> u64 {
    5
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            config_version: default_config_version(),
            servers: default_servers(),
            preferences: Preferences::default(),
            duplicate_window_secs: default_duplicate_window_secs(),
            duplicate_prefix_len: default_duplicate_prefix_len(),
            stats_poll_secs: default_stats_poll_secs(),
            reconnect_delay_secs: default_reconnect_delay_secs(),
        }
    }
}

impl AppConfig {
    /// Load configuration from disk, creating it with defaults if missing
    pub fn load() -> Result<Self, confy::ConfyError> {
        confy::load(APP_NAME, CONFIG_NAME)
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<(), confy::ConfyError> {
        confy::store(APP_NAME, CONFIG_NAME, self)
    }

    /// Get the config file path for display to user
    pub fn get_config_path() -> Result<std::path::PathBuf, confy::ConfyError> {
        confy::get_configuration_file_path(APP_NAME, CONFIG_NAME)
    }

    /// The server to connect to: the first enabled one
    pub fn active_server(&self) -> Option<&ServerConfig> {
        self.servers.iter().find(|s| s.enabled)
    }

    pub fn reconciler_config(&self) -> ReconcilerConfig {
        ReconcilerConfig {
            duplicate_window_secs: self.duplicate_window_secs.max(0.0),
            payload_prefix_len: self.duplicate_prefix_len,
            ..ReconcilerConfig::default()
        }
    }

    pub fn stats_poll_interval(&self) -> Duration {
        Duration::from_secs(self.stats_poll_secs.max(1))
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_has_enabled_local_server() {
        let config = AppConfig::default();
        let server = config.active_server().unwrap();
        assert_eq!(server.address, DEFAULT_ADDRESS);
        assert!(Uuid::parse_str(&server.id).is_ok());
    }

    #[test]
    fn test_first_enabled_server_wins() {
        let mut config = AppConfig::default();
        config.servers = vec![
            ServerConfig::new("Off".to_string(), "a:1".to_string(), false),
            ServerConfig::new("Hub".to_string(), "b:2".to_string(), true),
            ServerConfig::new("Spare".to_string(), "c:3".to_string(), true),
        ];
        assert_eq!(config.active_server().unwrap().name, "Hub");

        config.servers.iter_mut().for_each(|s| s.enabled = false);
        assert!(config.active_server().is_none());
    }

    #[test]
    fn test_reconciler_config_from_settings() {
        let config = AppConfig {
            duplicate_window_secs: 30.0,
            duplicate_prefix_len: 16,
            ..AppConfig::default()
        };
        let reconciler = config.reconciler_config();
        assert!((reconciler.duplicate_window_secs - 30.0).abs() < f64::EPSILON);
        assert_eq!(reconciler.payload_prefix_len, 16);
        assert!(reconciler.key_label);
    }

    #[test]
    fn test_poll_interval_never_zero() {
        let config = AppConfig { stats_poll_secs: 0, ..AppConfig::default() };
        assert_eq!(config.stats_poll_interval(), Duration::from_secs(1));
    }
}
