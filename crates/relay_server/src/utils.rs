//! Utility functions and helper methods for the relay server.
//!
//! This module provides convenient factory functions for creating server
//! instances with different configurations.

use crate::{config::ServerConfig, server::RelayServer};

/// Creates a new relay server with default configuration.
///
/// # Example
///
/// ```rust
/// use relay_server::create_server;
///
/// let server = create_server();
/// assert_eq!(server.config().hub.tick_interval_ms, 100);
/// ```
pub fn create_server() -> RelayServer {
    RelayServer::new(ServerConfig::default())
}

/// Creates a new relay server with custom configuration.
///
/// # Example
///
/// ```rust
/// use relay_server::{create_server_with_config, ServerConfig};
///
/// let config = ServerConfig {
///     bind_address: "0.0.0.0:9000".parse().unwrap(),
///     max_connections: 5000,
///     ..Default::default()
/// };
///
/// let server = create_server_with_config(config);
/// assert_eq!(server.config().max_connections, 5000);
/// ```
pub fn create_server_with_config(config: ServerConfig) -> RelayServer {
    RelayServer::new(config)
}
