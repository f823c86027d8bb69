//! The connection hub.
//!
//! A [`Hub`] is a single task that owns the set of active sessions and drives
//! the snapshot broadcast. Everything that changes that set arrives through one
//! queue per event kind (registration, deregistration, broadcast request) and is
//! handled one event at a time alongside the tick timer, so the set itself
//! needs no lock. The shared [`GameState`] is the only structure touched from
//! other tasks; it synchronizes itself.
//!
//! Other components talk to the hub through a cloneable [`HubHandle`]. The hub
//! loop ends on [`HubHandle::shutdown`] or once every handle has been dropped.
//!
//! # Example
//!
//! ```rust,no_run
//! # use relay_server::{config::HubConfig, hub::Hub};
//! # #[tokio::main]
//! # async fn main() -> Result<(), relay_server::ServerError> {
//! let (hub, _task) = Hub::spawn(HubConfig::default());
//! let (session, _io) = hub.open_session(Some("p1"));
//! hub.register(session.handle()).await?;
//! assert!(hub.game().contains("p1").await);
//! # Ok(())
//! # }
//! ```

pub mod stats;

pub use stats::{HubStats, HubStatsSnapshot};

use crate::{
    config::HubConfig,
    connection::{Connection, ConnectionIo, Session, SessionHandle, SessionId},
    error::ServerError,
    state::{GameState, PlayerId},
};
use axum::extract::ws::{Message, Utf8Bytes};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, trace, warn};

const REGISTER_QUEUE: usize = 64;
const BROADCAST_QUEUE: usize = 16;

struct Registration {
    session: SessionHandle,
    ack: oneshot::Sender<()>,
}

/// The hub event loop. Create with [`Hub::new`] or [`Hub::spawn`].
pub struct Hub {
    config: HubConfig,
    game: Arc<GameState>,
    stats: Arc<HubStats>,
    clients: HashMap<SessionId, SessionHandle>,
    register_rx: mpsc::Receiver<Registration>,
    unregister_rx: mpsc::UnboundedReceiver<SessionId>,
    broadcast_rx: mpsc::Receiver<Utf8Bytes>,
    shutdown_rx: watch::Receiver<bool>,
}

/// Cloneable entry point into a running [`Hub`].
#[derive(Debug, Clone)]
pub struct HubHandle {
    config: HubConfig,
    game: Arc<GameState>,
    stats: Arc<HubStats>,
    next_session_id: Arc<AtomicUsize>,
    register_tx: mpsc::Sender<Registration>,
    unregister_tx: mpsc::UnboundedSender<SessionId>,
    broadcast_tx: mpsc::Sender<Utf8Bytes>,
    shutdown_tx: Arc<watch::Sender<bool>>,
}

impl Hub {
    /// Creates a hub with an empty store. Nothing runs until [`Hub::run`] is
    /// polled.
    pub fn new(config: HubConfig) -> (Self, HubHandle) {
        let game = Arc::new(GameState::new());
        let stats = Arc::new(HubStats::default());
        let (register_tx, register_rx) = mpsc::channel(REGISTER_QUEUE);
        let (unregister_tx, unregister_rx) = mpsc::unbounded_channel();
        let (broadcast_tx, broadcast_rx) = mpsc::channel(BROADCAST_QUEUE);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = HubHandle {
            config: config.clone(),
            game: game.clone(),
            stats: stats.clone(),
            next_session_id: Arc::new(AtomicUsize::new(1)),
            register_tx,
            unregister_tx,
            broadcast_tx,
            shutdown_tx: Arc::new(shutdown_tx),
        };
        let hub = Self {
            config,
            game,
            stats,
            clients: HashMap::new(),
            register_rx,
            unregister_rx,
            broadcast_rx,
            shutdown_rx,
        };
        (hub, handle)
    }

    /// Creates a hub and runs it on a new task.
    pub fn spawn(config: HubConfig) -> (HubHandle, JoinHandle<()>) {
        let (hub, handle) = Self::new(config);
        (handle, tokio::spawn(hub.run()))
    }

    /// Runs the event loop until [`HubHandle::shutdown`] is called or every
    /// [`HubHandle`] is dropped. Sessions still active at that point are closed.
    pub async fn run(mut self) {
        let mut ticker = interval(self.config.tick_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!("🕒 Hub started with tick interval: {}ms", self.config.tick_interval_ms);

        loop {
            tokio::select! {
                registration = self.register_rx.recv() => match registration {
                    Some(Registration { session, ack }) => {
                        self.handle_register(session).await;
                        let _ = ack.send(());
                    }
                    None => break,
                },
                Some(session_id) = self.unregister_rx.recv() => {
                    self.handle_unregister(session_id).await;
                }
                Some(payload) = self.broadcast_rx.recv() => {
                    self.fan_out(payload).await;
                }
                Ok(()) = self.shutdown_rx.changed() => {
                    if *self.shutdown_rx.borrow_and_update() {
                        info!("🛑 Hub stopping, closing {} session(s)", self.clients.len());
                        break;
                    }
                }
                _ = ticker.tick() => {
                    self.handle_tick().await;
                }
            }
        }

        for (_, session) in self.clients.drain() {
            session.connection.close();
        }
        self.stats.set_active_sessions(0);
        info!("✅ Hub loop completed");
    }

    async fn handle_register(&mut self, session: SessionHandle) {
        let player = session.initial_player();
        if let Some(previous) = self.game.upsert(session.id, player).await {
            if let Some(stale) = self.clients.remove(&previous) {
                stale.connection.close();
                info!(
                    player_id = %session.player_id,
                    superseded_session = previous,
                    session_id = session.id,
                    "player reconnected, previous session closed"
                );
            }
        }

        info!(session_id = session.id, player_id = %session.player_id, "client registered");
        self.clients.insert(session.id, session);
        self.stats.record_registration();
        self.stats.set_active_sessions(self.clients.len());
    }

    async fn handle_unregister(&mut self, session_id: SessionId) {
        let Some(session) = self.clients.remove(&session_id) else {
            trace!(session_id, "unregister for inactive session ignored");
            return;
        };
        self.game.remove_owned(session.player_id.as_str(), session.id).await;
        self.stats.set_active_sessions(self.clients.len());
        session.connection.close();
        info!(session_id, player_id = %session.player_id, "client unregistered");
    }

    /// Queues `payload` for every active session. Sessions whose queue is full
    /// or closed are treated as dead and pruned.
    async fn fan_out(&mut self, payload: Utf8Bytes) {
        let mut dead = Vec::new();
        for (session_id, session) in &self.clients {
            if let Err(e) = session.connection.try_send(Message::Text(payload.clone())) {
                debug!(session_id = *session_id, player_id = %session.player_id, error = %e, "broadcast write failed");
                dead.push(*session_id);
            }
        }
        self.stats.record_broadcast();

        if dead.is_empty() {
            return;
        }
        let mut pruned = Vec::with_capacity(dead.len());
        for session_id in dead {
            if let Some(session) = self.clients.remove(&session_id) {
                self.game.remove_owned(session.player_id.as_str(), session.id).await;
                warn!(session_id = session.id, player_id = %session.player_id, "dropping unresponsive client");
                pruned.push(session);
            }
        }
        self.stats.record_pruned(pruned.len());
        self.stats.set_active_sessions(self.clients.len());
        for session in pruned {
            session.connection.close();
        }
    }

    async fn handle_tick(&mut self) {
        self.stats.record_tick();
        if self.clients.is_empty() {
            return;
        }
        match self.game.snapshot_json().await {
            Ok(json) => self.fan_out(Utf8Bytes::from(json)).await,
            Err(e) => {
                self.stats.record_skipped_tick();
                error!("Failed to serialize game state, skipping tick: {}", e);
            }
        }
    }
}

impl HubHandle {
    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    pub fn game(&self) -> Arc<GameState> {
        self.game.clone()
    }

    pub fn stats(&self) -> Arc<HubStats> {
        self.stats.clone()
    }

    pub fn next_session_id(&self) -> SessionId {
        self.next_session_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Creates a session with a fresh ID and a connection sized for this hub.
    ///
    /// The player ID is `requested` when non-empty, otherwise generated. The
    /// returned [`ConnectionIo`] belongs to the writer task.
    pub fn open_session(&self, requested: Option<&str>) -> (Session, ConnectionIo) {
        let (connection, io) = Connection::new(self.config.outbound_queue_size);
        let session = Session::new(
            self.next_session_id(),
            PlayerId::from_requested(requested),
            connection,
        );
        (session, io)
    }

    /// Adds a session to the active set and inserts its player at the spawn
    /// point. Returns once the hub has processed the registration.
    pub async fn register(&self, session: SessionHandle) -> Result<(), ServerError> {
        let (ack, acked) = oneshot::channel();
        self.register_tx
            .send(Registration { session, ack })
            .await
            .map_err(|_| ServerError::Hub("hub is not running".to_string()))?;
        acked
            .await
            .map_err(|_| ServerError::Hub("hub stopped before registration completed".to_string()))
    }

    /// Asks the hub to drop a session. Unknown sessions are ignored.
    pub fn unregister(&self, session_id: SessionId) {
        if self.unregister_tx.send(session_id).is_err() {
            trace!(session_id, "hub already stopped");
        }
    }

    /// Stops the hub loop. Active sessions are closed and later registrations
    /// fail.
    pub fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }

    /// Sends `payload` to every active session.
    pub async fn broadcast(&self, payload: impl Into<Utf8Bytes>) -> Result<(), ServerError> {
        self.broadcast_tx
            .send(payload.into())
            .await
            .map_err(|_| ServerError::Hub("hub is not running".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::{PlayerUpdate, Snapshot};
    use std::time::Duration;

    fn fast_config() -> HubConfig {
        HubConfig {
            tick_interval_ms: 20,
            ..HubConfig::default()
        }
    }

    async fn next_text(io: &mut ConnectionIo) -> String {
        loop {
            let message = tokio::time::timeout(Duration::from_secs(2), io.next_message())
                .await
                .expect("timed out waiting for a frame")
                .expect("connection queue closed");
            if let Message::Text(text) = message {
                return text.as_str().to_string();
            }
        }
    }

    async fn next_snapshot(io: &mut ConnectionIo) -> Snapshot {
        serde_json::from_str(&next_text(io).await).expect("tick payload is a snapshot")
    }

    async fn register(hub: &HubHandle, player: &str) -> (Session, ConnectionIo) {
        let (session, io) = hub.open_session(Some(player));
        hub.register(session.handle()).await.unwrap();
        (session, io)
    }

    #[tokio::test]
    async fn test_register_inserts_spawned_player() {
        let (hub, _task) = Hub::spawn(fast_config());
        let (session, _io) = register(&hub, "p1").await;

        let player = hub.game().get("p1").await.unwrap();
        assert_eq!(player, session.handle().initial_player());
        assert_eq!(hub.stats().active_sessions(), 1);
        assert_eq!(hub.stats().snapshot().registrations, 1);
    }

    #[tokio::test]
    async fn test_unregister_removes_player_and_closes() {
        let (hub, _task) = Hub::spawn(fast_config());
        let (session, _io) = register(&hub, "p1").await;

        hub.unregister(session.id());
        hub.unregister(session.id());
        hub.unregister(9999);
        session.connection().closed().await;

        assert!(!hub.game().contains("p1").await);
        assert_eq!(hub.stats().active_sessions(), 0);
    }

    #[tokio::test]
    async fn test_snapshot_tracks_registered_set() {
        let (hub, _task) = Hub::spawn(fast_config());
        let (a, _a_io) = register(&hub, "A").await;
        let (_b, mut b_io) = register(&hub, "B").await;

        hub.unregister(a.id());
        a.connection().closed().await;

        // Frames queued before the unregister may still mention A; the first
        // snapshot taken afterwards must not.
        loop {
            let snapshot = next_snapshot(&mut b_io).await;
            if snapshot.players.len() == 1 {
                assert!(snapshot.players.contains_key("B"));
                break;
            }
        }
    }

    #[tokio::test]
    async fn test_tick_broadcasts_latest_updates() {
        let (hub, _task) = Hub::spawn(fast_config());
        let (_p1, mut p1_io) = register(&hub, "p1").await;
        let (_p2, mut p2_io) = register(&hub, "p2").await;

        let update = PlayerUpdate {
            id: Some("p1".into()),
            x: 10.0,
            y: 20.0,
            velocity: 5.0,
            angle: 1.57,
        };
        hub.game().apply_update("p1", &update).await;

        for io in [&mut p1_io, &mut p2_io] {
            loop {
                let snapshot = next_snapshot(io).await;
                let p1 = &snapshot.players[&PlayerId::from("p1")];
                if p1.x == 10.0 {
                    assert_eq!((p1.y, p1.velocity, p1.angle), (20.0, 5.0, 1.57));
                    assert_eq!(snapshot.players.len(), 2);
                    break;
                }
            }
        }
    }

    #[tokio::test]
    async fn test_failed_write_prunes_only_that_session() {
        let config = HubConfig {
            tick_interval_ms: 60_000,
            ..HubConfig::default()
        };
        let (hub, _task) = Hub::spawn(config);
        let (healthy, mut healthy_io) = register(&hub, "healthy").await;
        let (dead, dead_io) = register(&hub, "dead").await;
        drop(dead_io);

        hub.broadcast("hello").await.unwrap();

        // The first tick fires on start; skip any snapshot queued before it.
        loop {
            if next_text(&mut healthy_io).await == "hello" {
                break;
            }
        }
        dead.connection().closed().await;
        assert!(!healthy.connection().is_closed());
        assert!(!hub.game().contains("dead").await);
        assert!(hub.game().contains("healthy").await);
        assert_eq!(hub.stats().active_sessions(), 1);
        assert_eq!(hub.stats().snapshot().pruned_sessions, 1);
    }

    #[tokio::test]
    async fn test_full_queue_counts_as_dead() {
        let config = HubConfig {
            tick_interval_ms: 60_000,
            outbound_queue_size: 1,
            ..HubConfig::default()
        };
        let (hub, _task) = Hub::spawn(config);
        let (slow, _slow_io) = register(&hub, "slow").await;

        hub.broadcast("one").await.unwrap();
        hub.broadcast("two").await.unwrap();

        slow.connection().closed().await;
        assert!(!hub.game().contains("slow").await);
    }

    #[tokio::test]
    async fn test_reconnect_with_same_id_supersedes() {
        let (hub, _task) = Hub::spawn(fast_config());
        let (first, _first_io) = register(&hub, "p1").await;
        hub.game()
            .apply_update(
                "p1",
                &PlayerUpdate {
                    id: None,
                    x: 1.0,
                    y: 1.0,
                    velocity: 1.0,
                    angle: 1.0,
                },
            )
            .await;

        let (second, _second_io) = register(&hub, "p1").await;
        first.connection().closed().await;

        assert_eq!(hub.game().len().await, 1);
        assert_eq!(hub.game().get("p1").await.unwrap(), second.handle().initial_player());
        assert_eq!(hub.game().owner_of("p1").await, Some(second.id()));

        // The stale session's late unregister leaves the new record alone.
        hub.unregister(first.id());
        hub.broadcast("sync").await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(hub.game().contains("p1").await);
        assert!(!second.connection().is_closed());
    }

    #[tokio::test]
    async fn test_handles_keep_independent_hubs_apart() {
        let (hub_a, _a) = Hub::spawn(fast_config());
        let (hub_b, _b) = Hub::spawn(fast_config());
        let (_s, _io) = register(&hub_a, "only-in-a").await;

        assert!(hub_a.game().contains("only-in-a").await);
        assert!(hub_b.game().is_empty().await);
    }

    #[tokio::test]
    async fn test_hub_stops_when_handles_dropped() {
        let (hub, task) = Hub::spawn(fast_config());
        let (session, _io) = register(&hub, "p1").await;
        drop(hub);

        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("hub should stop")
            .unwrap();
        assert!(session.connection().is_closed());
    }

    #[tokio::test]
    async fn test_shutdown_closes_sessions() {
        let (hub, task) = Hub::spawn(fast_config());
        let (a, _a_io) = register(&hub, "A").await;
        let (b, _b_io) = register(&hub, "B").await;

        hub.shutdown();
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("hub should stop")
            .unwrap();

        assert!(a.connection().is_closed());
        assert!(b.connection().is_closed());
        let (late, _io) = hub.open_session(Some("late"));
        assert!(hub.register(late.handle()).await.is_err());
    }

    #[tokio::test]
    async fn test_register_fails_after_hub_stops() {
        let (hub, task) = Hub::spawn(fast_config());
        task.abort();
        let _ = task.await;

        let (session, _io) = hub.open_session(None);
        assert!(matches!(hub.register(session.handle()).await, Err(ServerError::Hub(_))));
    }
}
