//! Server and hub configuration types and defaults.
//!
//! This module contains the configuration structures and default values
//! used to initialize and customize the relay server and its hub.

use crate::error::ServerError;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

/// Configuration structure for the relay server.
///
/// Contains the network-facing parameters of the transport boundary plus the
/// settings handed to the hub it drives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// The socket address to bind the server to
    pub bind_address: SocketAddr,

    /// Maximum number of concurrent sessions allowed
    pub max_connections: usize,

    /// Maximum inbound WebSocket message size in bytes
    pub max_message_size: usize,

    /// Maximum length of a client-supplied player ID
    pub max_player_id_len: usize,

    /// Hub timing and queueing settings
    pub hub: HubConfig,
}

/// Timing and queueing configuration for the hub and its sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubConfig {
    /// Snapshot broadcast period in milliseconds
    pub tick_interval_ms: u64,

    /// Capacity of each session's outbound queue, in messages
    pub outbound_queue_size: usize,

    /// Read deadline in milliseconds, refreshed by every inbound frame
    pub read_timeout_ms: u64,

    /// Upper bound for a single socket write, in milliseconds
    pub write_timeout_ms: u64,

    /// Interval between server-initiated pings, in milliseconds
    pub ping_interval_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([127, 0, 0, 1], 8080)),
            max_connections: 1000,
            max_message_size: 64 * 1024, // 64KB
            max_player_id_len: 64,
            hub: HubConfig::default(),
        }
    }
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 100, // 10 ticks per second
            outbound_queue_size: 32,
            read_timeout_ms: 60_000,
            write_timeout_ms: 10_000,
            ping_interval_ms: 54_000,
        }
    }
}

impl ServerConfig {
    /// Checks the invariants the server relies on at runtime.
    pub fn validate(&self) -> Result<(), ServerError> {
        if self.max_connections == 0 {
            return Err(ServerError::Config(
                "max_connections must be greater than 0".to_string(),
            ));
        }
        if self.max_player_id_len == 0 {
            return Err(ServerError::Config(
                "max_player_id_len must be greater than 0".to_string(),
            ));
        }
        self.hub.validate()
    }
}

impl HubConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }

    /// Checks that every interval is non-zero and that pings are sent often
    /// enough to keep an idle client inside its read deadline.
    pub fn validate(&self) -> Result<(), ServerError> {
        if self.tick_interval_ms == 0 {
            return Err(ServerError::Config(
                "tick_interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.outbound_queue_size == 0 {
            return Err(ServerError::Config(
                "outbound_queue_size must be greater than 0".to_string(),
            ));
        }
        if self.read_timeout_ms == 0 || self.write_timeout_ms == 0 || self.ping_interval_ms == 0 {
            return Err(ServerError::Config(
                "read, write and ping timeouts must be greater than 0".to_string(),
            ));
        }
        if self.ping_interval_ms >= self.read_timeout_ms {
            return Err(ServerError::Config(format!(
                "ping_interval_ms ({}) must be shorter than read_timeout_ms ({})",
                self.ping_interval_ms, self.read_timeout_ms
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ServerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.hub.tick_interval(), Duration::from_millis(100));
        assert_eq!(config.hub.read_timeout(), Duration::from_secs(60));
        assert!(config.hub.ping_interval() < config.hub.read_timeout());
    }

    #[test]
    fn test_ping_must_be_shorter_than_read_timeout() {
        let mut config = HubConfig::default();
        config.ping_interval_ms = config.read_timeout_ms;
        assert!(matches!(config.validate(), Err(ServerError::Config(_))));
    }

    #[test]
    fn test_zero_values_rejected() {
        let mut config = ServerConfig::default();
        config.max_connections = 0;
        assert!(config.validate().is_err());

        let mut config = ServerConfig::default();
        config.hub.tick_interval_ms = 0;
        assert!(config.validate().is_err());

        let mut config = ServerConfig::default();
        config.hub.outbound_queue_size = 0;
        assert!(config.validate().is_err());
    }
}
