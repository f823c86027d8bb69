//! HTTP routes in front of the hub.
//!
//! * `GET /api/health` answers `{"status":"ok"}`
//! * `GET /ws[?playerId=<id>]` upgrades to a WebSocket session
//! * anything else is `404 Not Found`

use crate::{config::ServerConfig, hub::HubHandle, server::handlers::run_session};
use axum::{
    extract::{ws::WebSocketUpgrade, ConnectInfo, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

pub const HEALTH_PATH: &str = "/api/health";
pub const WEBSOCKET_PATH: &str = "/ws";

/// Shared by every request handler.
#[derive(Debug, Clone)]
pub struct RouterState {
    pub config: Arc<ServerConfig>,
    pub hub: HubHandle,
    /// One permit per allowed session, held until the session ends
    pub slots: Arc<Semaphore>,
}

impl RouterState {
    pub fn new(config: Arc<ServerConfig>, hub: HubHandle) -> Self {
        let slots = Arc::new(Semaphore::new(config.max_connections));
        Self { config, hub, slots }
    }
}

/// Query string of a WebSocket upgrade request.
#[derive(Debug, Default, Deserialize)]
pub struct ConnectParams {
    #[serde(rename = "playerId")]
    pub player_id: Option<String>,
}

/// Builds the router for one server instance.
pub fn router(state: RouterState) -> Router {
    Router::new()
        .route(HEALTH_PATH, get(health))
        .route(WEBSOCKET_PATH, get(upgrade))
        .fallback(not_found)
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn not_found() -> StatusCode {
    StatusCode::NOT_FOUND
}

/// GET /ws
///
/// Checks the requested player ID and reserves a session slot before
/// accepting the upgrade; the slot is released when the session ends.
async fn upgrade(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    ConnectInfo(remote_addr): ConnectInfo<SocketAddr>,
    State(state): State<RouterState>,
) -> Response {
    let requested = params
        .player_id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty());

    if let Some(id) = &requested {
        if id.len() > state.config.max_player_id_len {
            warn!(%remote_addr, len = id.len(), "player ID too long");
            return (StatusCode::BAD_REQUEST, "playerId too long").into_response();
        }
    }

    let Ok(slot) = state.slots.clone().try_acquire_owned() else {
        warn!(%remote_addr, max_connections = state.config.max_connections, "connection refused, server full");
        return (StatusCode::SERVICE_UNAVAILABLE, "server full").into_response();
    };

    debug!(%remote_addr, player_id = ?requested, "upgrading connection");
    let hub = state.hub.clone();
    ws.max_message_size(state.config.max_message_size)
        .on_upgrade(move |socket| run_session(socket, requested, remote_addr, hub, slot))
}
