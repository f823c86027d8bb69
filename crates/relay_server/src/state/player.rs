//! Player identity and state records.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Spawn position shared by every newly registered player.
pub const SPAWN_X: f64 = 400.0;
pub const SPAWN_Y: f64 = 300.0;

/// Opaque player identifier, unique among currently connected players.
///
/// Clients may choose their own ID when connecting; otherwise the server
/// generates one with [`PlayerId::generate`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(String);

impl PlayerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh random ID (UUID v4, simple form).
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    /// Uses `requested` when it is non-empty after trimming, otherwise
    /// generates a new ID.
    pub fn from_requested(requested: Option<&str>) -> Self {
        match requested.map(str::trim) {
            Some(id) if !id.is_empty() => Self::new(id),
            _ => Self::generate(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for PlayerId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PlayerId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for PlayerId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Authoritative state of one connected player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub x: f64,
    pub y: f64,
    pub velocity: f64,
    /// Heading in whatever unit the client uses; never interpreted here.
    pub angle: f64,
}

impl Player {
    /// Creates a player at the spawn point, at rest, facing angle 0.
    pub fn spawn(id: PlayerId) -> Self {
        Self {
            id,
            x: SPAWN_X,
            y: SPAWN_Y,
            velocity: 0.0,
            angle: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spawn_defaults() {
        let player = Player::spawn(PlayerId::from("p1"));
        assert_eq!(player.id.as_str(), "p1");
        assert_eq!((player.x, player.y), (400.0, 300.0));
        assert_eq!(player.velocity, 0.0);
        assert_eq!(player.angle, 0.0);
    }

    #[test]
    fn test_requested_id_is_used_when_present() {
        assert_eq!(PlayerId::from_requested(Some("alice")).as_str(), "alice");
        assert_eq!(PlayerId::from_requested(Some("  bob ")).as_str(), "bob");
    }

    #[test]
    fn test_missing_or_blank_id_is_generated() {
        let a = PlayerId::from_requested(None);
        let b = PlayerId::from_requested(Some("   "));
        assert_eq!(a.as_str().len(), 32);
        assert_ne!(a, b);
    }

    #[test]
    fn test_player_serializes_flat() {
        let player = Player::spawn(PlayerId::from("p1"));
        let json = serde_json::to_value(&player).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"id": "p1", "x": 400.0, "y": 300.0, "velocity": 0.0, "angle": 0.0})
        );
    }
}
