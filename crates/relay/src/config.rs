//! Configuration management for the relay server.
//!
//! This module handles loading, validation, and conversion of server configuration
//! from TOML files and command-line arguments.

use relay_server::{HubConfig, ServerConfig};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

/// Log levels accepted in `[logging] level`.
pub const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Application configuration loaded from TOML file.
///
/// Every table and every field is optional; anything missing takes the
/// library default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Network and connection settings
    pub server: ServerSettings,
    /// Hub timing and queue settings
    pub hub: HubSettings,
    /// Logging configuration settings
    pub logging: LoggingSettings,
}

/// Server-specific configuration settings.
///
/// Controls network binding and connection limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Network address to bind the server to (e.g., "127.0.0.1:8080")
    pub bind_address: String,
    /// Maximum number of concurrent sessions
    pub max_connections: usize,
    /// Largest inbound WebSocket message, in bytes
    pub max_message_size: usize,
    /// Longest accepted `playerId` query parameter, in bytes
    pub max_player_id_len: usize,
}

/// Hub timing and per-session queue settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubSettings {
    /// Snapshot broadcast interval in milliseconds
    pub tick_interval_ms: u64,
    /// Frames buffered per session before it is treated as dead
    pub outbound_queue_size: usize,
    pub read_timeout_ms: u64,
    pub write_timeout_ms: u64,
    pub ping_interval_ms: u64,
}

/// Logging system configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    pub level: String,
    /// Whether to output logs in JSON format
    pub json_format: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        let defaults = ServerConfig::default();
        Self {
            bind_address: defaults.bind_address.to_string(),
            max_connections: defaults.max_connections,
            max_message_size: defaults.max_message_size,
            max_player_id_len: defaults.max_player_id_len,
        }
    }
}

impl Default for HubSettings {
    fn default() -> Self {
        let defaults = HubConfig::default();
        Self {
            tick_interval_ms: defaults.tick_interval_ms,
            outbound_queue_size: defaults.outbound_queue_size,
            read_timeout_ms: defaults.read_timeout_ms,
            write_timeout_ms: defaults.write_timeout_ms,
            ping_interval_ms: defaults.ping_interval_ms,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

impl AppConfig {
    /// Loads configuration from a TOML file.
    ///
    /// If the file doesn't exist, creates a default configuration file at the specified path
    /// and returns the default configuration.
    pub async fn load_from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path).await?;
            let config: AppConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content).await?;
            info!("Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    /// Converts the application configuration to the server library's types.
    pub fn to_server_config(&self) -> Result<ServerConfig, Box<dyn std::error::Error>> {
        Ok(ServerConfig {
            bind_address: self.server.bind_address.parse()?,
            max_connections: self.server.max_connections,
            max_message_size: self.server.max_message_size,
            max_player_id_len: self.server.max_player_id_len,
            hub: HubConfig {
                tick_interval_ms: self.hub.tick_interval_ms,
                outbound_queue_size: self.hub.outbound_queue_size,
                read_timeout_ms: self.hub.read_timeout_ms,
                write_timeout_ms: self.hub.write_timeout_ms,
                ping_interval_ms: self.hub.ping_interval_ms,
            },
        })
    }

    /// Validates the configuration.
    ///
    /// # Returns
    ///
    /// `Ok(())` if the configuration is valid, or an error string describing the issue.
    pub fn validate(&self) -> Result<(), String> {
        if self.server.bind_address.parse::<std::net::SocketAddr>().is_err() {
            return Err(format!(
                "Invalid bind address: {}",
                &self.server.bind_address
            ));
        }

        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            return Err(format!(
                "Invalid log level: {}. Must be one of: {VALID_LOG_LEVELS:?}",
                &self.logging.level
            ));
        }

        let server_config = self.to_server_config().map_err(|e| e.to_string())?;
        server_config.validate().map_err(|e| e.to_string())
    }
}
