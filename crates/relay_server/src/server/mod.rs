//! Core server implementation and connection handling.
//!
//! This module contains the main relay server structure, the HTTP routes in
//! front of the WebSocket upgrade, the listener that feeds them, and the
//! per-connection session driver.

pub mod core;
pub mod handlers;
pub mod listener;
pub mod routes;

pub use core::RelayServer;
pub use listener::RelayListener;
pub use routes::{router, RouterState};
