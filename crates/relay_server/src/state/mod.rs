//! Shared player state store.
//!
//! [`GameState`] is the single authoritative mapping from player ID to player
//! record. It is read by the hub's tick (snapshot serialization) and written by
//! registration, every session's read loop, and deregistration, so every
//! operation takes the internal reader/writer lock itself.
//!
//! Each record remembers the session that owns it. A client reconnecting with
//! the same player ID hands the record to the new session, after which the old
//! session's late updates and cleanup no longer touch it.

pub mod player;

pub use player::{Player, PlayerId, SPAWN_X, SPAWN_Y};

use crate::connection::SessionId;
use crate::messaging::{PlayerUpdate, Snapshot};
use serde::ser::{Serialize, Serializer};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::trace;

#[derive(Debug)]
struct Slot {
    owner: SessionId,
    player: Player,
}

impl Slot {
    fn apply(&mut self, update: &PlayerUpdate) {
        self.player.x = update.x;
        self.player.y = update.y;
        self.player.velocity = update.velocity;
        self.player.angle = update.angle;
    }
}

/// Concurrency-safe store of all connected players.
#[derive(Debug, Default)]
pub struct GameState {
    players: RwLock<HashMap<PlayerId, Slot>>,
}

impl GameState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces the record for `player.id`, owned by `owner`.
    ///
    /// Returns the previous owner when a different session held this ID.
    pub async fn upsert(&self, owner: SessionId, player: Player) -> Option<SessionId> {
        let mut players = self.players.write().await;
        let id = player.id.clone();
        players
            .insert(id, Slot { owner, player })
            .map(|previous| previous.owner)
            .filter(|previous| *previous != owner)
    }

    /// Overwrites the mutable fields of `id`'s record. Unknown IDs are ignored.
    pub async fn apply_update(&self, id: &str, update: &PlayerUpdate) -> bool {
        let mut players = self.players.write().await;
        match players.get_mut(id) {
            Some(slot) => {
                slot.apply(update);
                true
            }
            None => {
                trace!(player_id = %id, "update for unknown player ignored");
                false
            }
        }
    }

    /// Like [`apply_update`](Self::apply_update), but only when `owner` still
    /// owns the record.
    pub async fn apply_update_from(&self, owner: SessionId, id: &str, update: &PlayerUpdate) -> bool {
        let mut players = self.players.write().await;
        match players.get_mut(id) {
            Some(slot) if slot.owner == owner => {
                slot.apply(update);
                true
            }
            _ => false,
        }
    }

    /// Removes `id`'s record if present. Returns whether anything was removed.
    pub async fn remove(&self, id: &str) -> bool {
        self.players.write().await.remove(id).is_some()
    }

    /// Removes `id`'s record only if `owner` still owns it.
    pub async fn remove_owned(&self, id: &str, owner: SessionId) -> bool {
        let mut players = self.players.write().await;
        match players.get(id) {
            Some(slot) if slot.owner == owner => {
                players.remove(id);
                true
            }
            _ => false,
        }
    }

    /// Serializes `{"players": {...}}` while holding the read lock.
    pub async fn snapshot_json(&self) -> Result<String, serde_json::Error> {
        let players = self.players.read().await;
        serde_json::to_string(&SnapshotRef {
            players: PlayersRef(&players),
        })
    }

    /// Owned copy of every record, taken under the read lock.
    pub async fn snapshot(&self) -> Snapshot {
        let players = self.players.read().await;
        Snapshot {
            players: players
                .iter()
                .map(|(id, slot)| (id.clone(), slot.player.clone()))
                .collect(),
        }
    }

    pub async fn get(&self, id: &str) -> Option<Player> {
        self.players.read().await.get(id).map(|slot| slot.player.clone())
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.players.read().await.contains_key(id)
    }

    /// Session currently owning `id`'s record.
    pub async fn owner_of(&self, id: &str) -> Option<SessionId> {
        self.players.read().await.get(id).map(|slot| slot.owner)
    }

    pub async fn len(&self) -> usize {
        self.players.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.players.read().await.is_empty()
    }
}

#[derive(serde::Serialize)]
struct SnapshotRef<'a> {
    players: PlayersRef<'a>,
}

struct PlayersRef<'a>(&'a HashMap<PlayerId, Slot>);

impl Serialize for PlayersRef<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter().map(|(id, slot)| (id, &slot.player)))
    }
}
