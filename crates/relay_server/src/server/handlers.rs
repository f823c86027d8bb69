//! Connection handling logic for WebSocket clients.
//!
//! This module drives one upgraded connection from registration to cleanup:
//! the writer task, hub registration, and the session read loop.

use crate::{connection::write_loop, hub::HubHandle};
use axum::extract::ws::WebSocket;
use futures_util::StreamExt;
use std::net::SocketAddr;
use tokio::sync::OwnedSemaphorePermit;
use tracing::{info, warn};

/// Runs a single upgraded client connection until it ends.
///
/// # Connection Flow
///
/// 1. Open a session for the requested (or a generated) player ID
/// 2. Start its writer task
/// 3. Register it with the hub, which spawns the player
/// 4. Run the session read loop until the client goes away
///
/// The hub and the store are cleaned up by the read loop itself, so this
/// function only waits for the writer to flush its Close frame. `slot` is the
/// connection-limit permit and is released on return.
pub async fn run_session(
    socket: WebSocket,
    requested: Option<String>,
    remote_addr: SocketAddr,
    hub: HubHandle,
    slot: OwnedSemaphorePermit,
) {
    let (ws_sender, ws_receiver) = socket.split();
    let (session, io) = hub.open_session(requested.as_deref());
    let session = session.with_remote_addr(remote_addr);
    let hub_config = hub.config().clone();

    let writer = tokio::spawn(write_loop(
        ws_sender,
        io,
        hub_config.write_timeout(),
        hub_config.ping_interval(),
    ));

    if let Err(e) = hub.register(session.handle()).await {
        warn!(%remote_addr, error = %e, "session not registered");
        session.connection().close();
        let _ = writer.await;
        return;
    }
    info!(
        session_id = session.id(),
        player_id = %session.player_id(),
        %remote_addr,
        "🔗 Client connected"
    );

    let session_id = session.id();
    let reason = session
        .read_loop(ws_receiver, hub.clone(), hub_config.read_timeout())
        .await;
    if let Err(e) = writer.await {
        warn!(session_id, error = %e, "writer task failed");
    }
    drop(slot);
    info!(session_id, %remote_addr, %reason, "🔌 Client disconnected");
}
