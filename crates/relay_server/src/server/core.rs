//! Core relay server implementation.
//!
//! This module contains the main `RelayServer` struct, which owns the hub and
//! the HTTP server in front of it and coordinates their shutdown.

use crate::{
    config::ServerConfig,
    error::ServerError,
    hub::{Hub, HubHandle},
    server::listener::RelayListener,
    server::routes::{router, RouterState},
};
use axum::serve::ListenerExt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{watch, Mutex};
use tokio::time::timeout;
use tracing::{error, info, warn};

const HUB_STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// The relay server.
///
/// `RelayServer` serves the HTTP routes (health check and WebSocket upgrade)
/// and runs the [`Hub`] that ticks snapshots out to every registered session.
/// One server instance owns exactly one hub and one player store; separate
/// instances share nothing.
pub struct RelayServer {
    /// Server configuration settings
    config: Arc<ServerConfig>,

    /// Handle to the hub; shared with every request handler
    hub: HubHandle,

    /// The hub loop, taken out when the server starts
    hub_runner: Mutex<Option<Hub>>,

    /// Channel for coordinating server shutdown
    shutdown_sender: watch::Sender<bool>,
}

impl RelayServer {
    /// Creates a new relay server with the specified configuration.
    ///
    /// The hub and the player store are created here but nothing runs until
    /// [`start`](Self::start) is called.
    pub fn new(config: ServerConfig) -> Self {
        let (hub_runner, hub) = Hub::new(config.hub.clone());
        let (shutdown_sender, _) = watch::channel(false);
        Self {
            config: Arc::new(config),
            hub,
            hub_runner: Mutex::new(Some(hub_runner)),
            shutdown_sender,
        }
    }

    /// Binds the configured address and serves until [`shutdown`](Self::shutdown).
    pub async fn start(&self) -> Result<(), ServerError> {
        self.config.validate()?;
        let listener = TcpListener::bind(self.config.bind_address)
            .await
            .map_err(|e| ServerError::Network(format!("Failed to bind {}: {e}", self.config.bind_address)))?;
        self.start_with_listener(listener).await
    }

    /// Serves on an already bound listener until [`shutdown`](Self::shutdown).
    ///
    /// A server can only be started once. Failed accepts are retried and
    /// never stop the server.
    pub async fn start_with_listener(&self, listener: TcpListener) -> Result<(), ServerError> {
        let hub_runner = self
            .hub_runner
            .lock()
            .await
            .take()
            .ok_or_else(|| ServerError::Internal("server already started".to_string()))?;

        let local_addr = listener.local_addr()?;
        info!("🚀 Starting relay server on {}", local_addr);
        info!("🌐 WebSocket endpoint: ws://{}/ws", local_addr);
        let hub_task = tokio::spawn(hub_runner.run());

        let app = router(RouterState::new(self.config.clone(), self.hub.clone()))
            .into_make_service_with_connect_info::<SocketAddr>();

        let mut shutdown_receiver = self.shutdown_sender.subscribe();
        let hub = self.hub.clone();
        let shutdown_signal = async move {
            let _ = shutdown_receiver.wait_for(|stop| *stop).await;
            info!("🧹 Performing server cleanup...");
            // Upgraded sessions are not tracked by the HTTP server; the hub
            // closes them.
            hub.shutdown();
        };

        let result = axum::serve(RelayListener::new(listener).tap_io(|_| {}), app)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| ServerError::Network(format!("server error: {e}")));

        self.hub.shutdown();
        match timeout(HUB_STOP_TIMEOUT, hub_task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("Hub task failed: {}", e),
            Err(_) => warn!("Hub did not stop within {:?}", HUB_STOP_TIMEOUT),
        }
        info!("Server stopped");
        result
    }

    /// Signals the server to stop accepting connections and close every
    /// session.
    pub async fn shutdown(&self) -> Result<(), ServerError> {
        info!("🛑 Shutting down server...");
        self.shutdown_sender.send_replace(true);
        Ok(())
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Gets a handle to the server's hub, for stats or server-side broadcasts.
    pub fn hub(&self) -> HubHandle {
        self.hub.clone()
    }
}
