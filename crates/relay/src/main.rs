//! # Relay Server - Main Entry Point
//!
//! ```bash
//! # Run with default configuration
//! relay
//!
//! # Specify custom configuration
//! relay --config production.toml
//!
//! # Override specific settings
//! relay --bind 0.0.0.0:8080 --tick-ms 50 --log-level debug
//!
//! # JSON logging for production
//! relay --json-logs
//! ```

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    lib_relay::init().await
}
