//! Message type definitions for client-server communication.
//!
//! Clients send [`PlayerUpdate`] objects describing their own movement; the
//! server answers every tick with a [`Snapshot`] of all connected players.

use crate::state::{Player, PlayerId};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;

/// A movement update sent from a client to the server.
///
/// The four numeric fields replace the corresponding fields of the sender's
/// own player record; a field that is missing or `null` is read as `0`.
/// `id` is optional; when present it must name the sender's own player or the
/// update is dropped.
///
/// # Example
///
/// ```json
/// {"id": "p1", "x": 10.0, "y": 20.0, "velocity": 5.0, "angle": 1.57}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<PlayerId>,
    #[serde(default, deserialize_with = "number_or_zero")]
    pub x: f64,
    #[serde(default, deserialize_with = "number_or_zero")]
    pub y: f64,
    #[serde(default, deserialize_with = "number_or_zero")]
    pub velocity: f64,
    #[serde(default, deserialize_with = "number_or_zero")]
    pub angle: f64,
}

fn number_or_zero<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or_default())
}

impl PlayerUpdate {
    /// Parses a raw text or binary frame payload.
    pub fn parse(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }

    /// Returns true when the update may be applied to `player_id`'s record.
    pub fn targets(&self, player_id: &PlayerId) -> bool {
        self.id.as_ref().map_or(true, |id| id == player_id)
    }
}

/// Full world state broadcast to every session each tick.
///
/// ```json
/// {"players": {"p1": {"id": "p1", "x": 10.0, "y": 20.0, "velocity": 5.0, "angle": 1.57}}}
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub players: HashMap<PlayerId, Player>,
}
