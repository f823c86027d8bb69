//! Logging system setup and configuration.
//!
//! This module handles the initialization and configuration of the tracing-based
//! logging system with support for both human-readable and JSON output formats.

use crate::config::LoggingSettings;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Crates whose debug output drowns the relay's own per-session logs.
const QUIET_DEPENDENCIES: &[&str] = &["hyper", "hyper_util", "tungstenite", "tokio_tungstenite"];

/// Filter directives for `level`, with HTTP and WebSocket internals held at
/// `warn` unless `level` is stricter than that.
pub fn default_directives(level: &str) -> String {
    let mut directives = level.to_string();
    if matches!(level, "trace" | "debug" | "info") {
        for target in QUIET_DEPENDENCIES {
            directives.push_str(&format!(",{target}=warn"));
        }
    }
    directives
}

/// Initializes the logging system with the specified configuration.
///
/// `RUST_LOG` takes precedence over the configured level when set. JSON output
/// is used when either the config file or the CLI asks for it; session fields
/// (`session_id`, `player_id`, `remote_addr`) are flattened into each record.
pub fn setup_logging(
    config: &LoggingSettings,
    json_format: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let log_level = config.level.as_str();
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_directives(log_level))?,
    };

    let registry = tracing_subscriber::registry().with(filter);

    if json_format || config.json_format {
        registry
            .with(fmt::layer()
                .json()
                .flatten_event(true)
                .with_current_span(false)
                .with_span_list(false)
            )
            .try_init()?;
    } else {
        registry
            .with(fmt::layer()
                .compact()
                .with_target(false)
            )
            .try_init()?;
    }

    info!("🔧 Logging initialized with level: {}", log_level);
    Ok(())
}

/// Displays the startup banner using proper logging.
pub fn display_banner() {
    let version = option_env!("CARGO_PKG_VERSION").unwrap_or("UNK");
    info!("╔══════════════════════════════════════════╗");
    info!("║             📡 RELAY SERVER 📡           ║");
    info!("║                  v{:<8}               ║", version);
    info!("║                                          ║");
    info!("║  Real-Time Player State Relay            ║");
    info!("║  WebSocket in, snapshots out             ║");
    info!("║                                          ║");
    info!("╚══════════════════════════════════════════╝");
}
