//! Error types and handling for the relay server.
//!
//! This module defines the error types that can occur during server operations,
//! providing clear categorization of different failure modes.

/// Enumeration of possible server errors.
///
/// Categorizes errors into network-related, hub, configuration, and internal
/// errors to help with debugging and error handling.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Network-related errors such as binding failures or connection issues
    #[error("Network error: {0}")]
    Network(String),

    /// The hub event loop is no longer running
    #[error("Hub error: {0}")]
    Hub(String),

    /// Invalid server or hub configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal server errors such as serialization failures
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for ServerError {
    fn from(err: std::io::Error) -> Self {
        ServerError::Network(err.to_string())
    }
}
