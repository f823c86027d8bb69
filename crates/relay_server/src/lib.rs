//! # Relay Server - Real-Time Player State Relay
//!
//! A small multiplayer relay: clients connect over WebSocket, stream their own
//! position updates, and receive a full snapshot of every connected player at a
//! fixed tick rate. The server holds no game rules; it only keeps the latest
//! state each client reported and fans it out.
//!
//! ## Architecture Overview
//!
//! ### Core Components
//!
//! * **Game State** ([`state::GameState`]) - The authoritative player map, shared
//!   between the hub and every session behind a reader/writer lock
//! * **Hub** ([`hub::Hub`]) - A single task owning the set of active sessions;
//!   handles registration, deregistration and the tick broadcast
//! * **Sessions** ([`connection::Session`]) - One per client: a read loop that
//!   applies updates, and a writer task draining a bounded outbound queue
//! * **Server** ([`RelayServer`]) - The accept loop and HTTP routing in front of
//!   the WebSocket upgrade
//!
//! ### Message Flow
//!
//! 1. Client connects to `/ws?playerId=<id>` and is registered at the spawn point
//! 2. Client sends `{"id","x","y","velocity","angle"}` frames for its own player
//! 3. Every tick the hub serializes `{"players":{...}}` once and queues it for
//!    every session
//! 4. Sessions that cannot keep up, or whose connection failed, are pruned
//!
//! ## Configuration
//!
//! The server is configured through [`ServerConfig`], with hub timing in
//! [`config::HubConfig`]:
//!
//! * **Network settings** - Bind address, connection limit
//! * **Hub timing** - Tick interval, read/write deadlines, ping interval
//! * **Limits** - Outbound queue depth, message size, player ID length
//!
//! ## Error Handling
//!
//! Fallible operations return [`ServerError`]. Per-client failures (malformed
//! frames, dead connections) are logged and contained to that client; they
//! never surface as errors from the server itself.

// Re-export core types and functions for easy access
pub use config::{HubConfig, ServerConfig};
pub use error::ServerError;
pub use hub::{Hub, HubHandle, HubStats, HubStatsSnapshot};
pub use messaging::{PlayerUpdate, Snapshot};
pub use server::RelayServer;
pub use state::{GameState, Player, PlayerId, SPAWN_X, SPAWN_Y};
pub use utils::{create_server, create_server_with_config};

// Public module declarations
pub mod config;
pub mod connection;
pub mod error;
pub mod hub;
pub mod messaging;
pub mod server;
pub mod state;
pub mod utils;

mod tests;
