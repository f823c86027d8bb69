//! Wire messages exchanged between clients and the server.
//!
//! Both directions are JSON text frames.

pub mod types;

pub use types::{PlayerUpdate, Snapshot};
