//! Main application logic and lifecycle management.
//!
//! This module contains the `Application` struct that orchestrates server
//! startup, periodic hub statistics, and shutdown.

use crate::{
    cli::CliArgs,
    config::AppConfig,
    logging::display_banner,
    signals::{setup_signal_handlers, setup_signal_handlers_silent},
};
use relay_server::{HubHandle, HubStatsSnapshot, RelayServer};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

const MONITOR_INTERVAL: Duration = Duration::from_secs(60);
const SERVER_STOP_TIMEOUT: Duration = Duration::from_secs(8);

/// Main application struct.
///
/// Owns the merged configuration and the relay server, and drives the
/// process from startup to shutdown.
pub struct Application {
    /// Loaded application configuration
    config: AppConfig,
    /// Relay server instance
    server: Arc<RelayServer>,
}

impl Application {
    /// Creates a new application instance.
    ///
    /// # Process
    ///
    /// 1. Load configuration from file (creating default if missing)
    /// 2. Apply command-line argument overrides
    /// 3. Validate merged configuration
    /// 4. Display startup banner
    /// 5. Initialize the relay server with configuration
    pub async fn new(args: CliArgs) -> Result<Self, Box<dyn std::error::Error>> {
        info!("🔧 Loading configuration from: {}", args.config_path.display());
        let mut config = AppConfig::load_from_file(&args.config_path).await?;
        info!("✅ Configuration loaded successfully from {}", args.config_path.display());

        apply_overrides(&mut config, &args);

        if let Err(e) = config.validate() {
            return Err(format!("Configuration validation failed: {e}").into());
        } else {
            info!("✅ Configuration loaded and validated successfully");
        }

        display_banner();

        let server_config = config.to_server_config()?;
        let server = Arc::new(RelayServer::new(server_config));

        info!("📂 Config: {}", args.config_path.display());

        Ok(Self { config, server })
    }

    /// Runs the server until a shutdown signal arrives or the server fails.
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        info!("🌟 Starting Relay Server Application");
        self.log_configuration_summary();

        let hub = self.server.hub();

        let mut server_handle = {
            let server = self.server.clone();
            tokio::spawn(async move { server.start().await })
        };

        let monitoring_handle = {
            let hub = hub.clone();
            tokio::spawn(async move { monitor_hub(hub, MONITOR_INTERVAL).await })
        };

        info!(
            "🎮 Ready to accept connections on {}",
            self.config.server.bind_address
        );
        info!("🔍 Health monitoring active - stats every 60 seconds");
        info!("🛑 Press Ctrl+C to gracefully shutdown");

        tokio::select! {
            result = &mut server_handle => {
                monitoring_handle.abort();
                return match result {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(e)) => Err(format!("Server error: {e}").into()),
                    Err(e) => Err(format!("Server task failed: {e}").into()),
                };
            }
            signal = setup_signal_handlers() => signal?,
        }

        // merciless shutdown
        tokio::spawn(async move {
            if let Err(e) = setup_signal_handlers_silent().await {
                error!("Failed to set up merciless shutdown signal handler: {e}");
                return;
            }

            warn!("Shutdown handler received again! I'll make this quick.");
            std::process::exit(1);
        });

        info!("🛑 Shutdown signal received, beginning graceful shutdown...");
        monitoring_handle.abort();

        self.server.shutdown().await?;
        match tokio::time::timeout(SERVER_STOP_TIMEOUT, server_handle).await {
            Ok(Ok(Ok(()))) => info!("✅ Server task completed gracefully"),
            Ok(Ok(Err(e))) => error!("❌ Server error during shutdown: {}", e),
            Ok(Err(e)) => error!("❌ Server task failed: {}", e),
            Err(_) => warn!("⏰ Server task did not complete within {:?}", SERVER_STOP_TIMEOUT),
        }

        log_final_statistics(&hub.stats().snapshot());
        info!("✅ Relay Server shutdown complete");
        Ok(())
    }

    /// Logs the configuration summary at startup.
    fn log_configuration_summary(&self) {
        info!("📋 Configuration Summary:");
        info!("  🌐 Bind address: {}", self.config.server.bind_address);
        info!("  👥 Max connections: {}", self.config.server.max_connections);
        info!("  🕒 Tick interval: {}ms", self.config.hub.tick_interval_ms);
        info!("  📬 Outbound queue: {} frames", self.config.hub.outbound_queue_size);
        info!(
            "  ⏱️ Read timeout: {}ms | Ping interval: {}ms",
            self.config.hub.read_timeout_ms, self.config.hub.ping_interval_ms
        );
    }
}

/// Applies command-line overrides on top of the file configuration.
pub fn apply_overrides(config: &mut AppConfig, args: &CliArgs) {
    if let Some(bind_address) = &args.bind_address {
        config.server.bind_address = bind_address.clone();
    }

    if let Some(log_level) = &args.log_level {
        config.logging.level = log_level.clone();
    }

    if args.json_logs {
        config.logging.json_format = true;
    }

    if let Some(tick_interval_ms) = args.tick_interval_ms {
        config.hub.tick_interval_ms = tick_interval_ms;
    }
}

/// Logs one line of hub statistics every `period`.
async fn monitor_hub(hub: HubHandle, period: Duration) {
    let mut interval = tokio::time::interval(period);
    let mut last = hub.stats().snapshot();
    // The first tick completes immediately.
    interval.tick().await;

    loop {
        interval.tick().await;
        let current = hub.stats().snapshot();
        info!(
            "📊 Hub Health - {} sessions | {} ticks | {} broadcasts | {} new sessions | {} pruned",
            current.active_sessions,
            current.ticks - last.ticks,
            current.broadcasts - last.broadcasts,
            current.registrations - last.registrations,
            current.pruned_sessions - last.pruned_sessions,
        );
        if current.skipped_ticks > last.skipped_ticks {
            warn!(
                "⚠️ {} tick(s) skipped on serialization errors",
                current.skipped_ticks - last.skipped_ticks
            );
        }
        last = current;
    }
}

/// Logs final statistics during shutdown.
fn log_final_statistics(stats: &HubStatsSnapshot) {
    info!("📊 Final Statistics:");
    info!("  - Sessions registered: {}", stats.registrations);
    info!("  - Ticks: {}", stats.ticks);
    info!("  - Broadcasts: {}", stats.broadcasts);
    info!("  - Sessions pruned: {}", stats.pruned_sessions);
}
