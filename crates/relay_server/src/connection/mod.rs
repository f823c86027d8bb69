//! Connection management for client sessions.
//!
//! This module handles the lifecycle of client connections: the outbound queue
//! and close signal shared with the hub, the writer task that drains it, and
//! the session read loop that feeds player updates into the store.

pub mod session;
pub mod transport;

pub use session::{DisconnectReason, Session, SessionHandle};
pub use transport::{write_loop, Connection, ConnectionIo, SendError};

/// Type alias for session identifiers.
///
/// Session IDs are allocated by the hub handle from an atomic counter and
/// identify one connection for its whole lifetime; they are never reused.
pub type SessionId = usize;
