//! Per-client session: one transport connection bound to one player record.

use super::{Connection, SessionId};
use crate::hub::HubHandle;
use crate::messaging::PlayerUpdate;
use crate::state::{GameState, Player, PlayerId};
use axum::extract::ws::Message;
use futures::{Stream, StreamExt};
use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::time::{timeout, Instant};
use tracing::{debug, info, trace, warn};

/// Why a session's read loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The client sent a Close frame
    ClientClosed,
    /// The inbound stream ended without a Close frame
    StreamEnded,
    /// Nothing arrived within the read deadline
    ReadTimeout,
    /// The transport reported a protocol or I/O error
    TransportError(String),
    /// Another party (the hub or the writer task) closed the connection
    ClosedByServer,
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisconnectReason::ClientClosed => f.write_str("client closed"),
            DisconnectReason::StreamEnded => f.write_str("stream ended"),
            DisconnectReason::ReadTimeout => f.write_str("read timeout"),
            DisconnectReason::TransportError(e) => write!(f, "transport error: {e}"),
            DisconnectReason::ClosedByServer => f.write_str("closed by server"),
        }
    }
}

/// What the hub keeps for each active session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub id: SessionId,
    pub player_id: PlayerId,
    pub connection: Connection,
}

impl SessionHandle {
    /// The record this session starts with when registered.
    pub fn initial_player(&self) -> Player {
        Player::spawn(self.player_id.clone())
    }
}

/// Server-side state of one connected client.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    player_id: PlayerId,
    remote_addr: Option<SocketAddr>,
    connected_at: Instant,
    connection: Connection,
}

impl Session {
    pub fn new(id: SessionId, player_id: PlayerId, connection: Connection) -> Self {
        Self {
            id,
            player_id,
            remote_addr: None,
            connected_at: Instant::now(),
            connection,
        }
    }

    pub fn with_remote_addr(mut self, remote_addr: SocketAddr) -> Self {
        self.remote_addr = Some(remote_addr);
        self
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn player_id(&self) -> &PlayerId {
        &self.player_id
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    /// Time since the session was opened.
    pub fn connected_for(&self) -> Duration {
        self.connected_at.elapsed()
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            id: self.id,
            player_id: self.player_id.clone(),
            connection: self.connection.clone(),
        }
    }

    /// Reads client frames until the connection ends, applying every valid
    /// update to this session's own player.
    ///
    /// The read deadline restarts with every received frame, pings and pongs
    /// included. However the loop ends, the player is removed from the store,
    /// the connection is closed and the hub is told to drop the session.
    pub async fn read_loop<R, E>(self, mut stream: R, hub: HubHandle, read_timeout: Duration) -> DisconnectReason
    where
        R: Stream<Item = Result<Message, E>> + Unpin,
        E: fmt::Display,
    {
        let game = hub.game();

        let reason = loop {
            let frame = tokio::select! {
                _ = self.connection.closed() => break DisconnectReason::ClosedByServer,
                frame = timeout(read_timeout, stream.next()) => frame,
            };

            let message = match frame {
                Err(_) => break DisconnectReason::ReadTimeout,
                Ok(None) => break DisconnectReason::StreamEnded,
                Ok(Some(Err(e))) => break DisconnectReason::TransportError(e.to_string()),
                Ok(Some(Ok(message))) => message,
            };

            match message {
                Message::Text(text) => self.apply_frame(&game, text.as_str().as_bytes()).await,
                Message::Binary(data) => self.apply_frame(&game, &data).await,
                Message::Ping(data) => {
                    if let Err(e) = self.connection.try_send(Message::Pong(data)) {
                        trace!(session_id = self.id, error = %e, "pong not queued");
                    }
                }
                Message::Close(_) => break DisconnectReason::ClientClosed,
                Message::Pong(_) => {}
            }
        };

        game.remove_owned(self.player_id.as_str(), self.id).await;
        self.connection.close();
        hub.unregister(self.id);

        let remote_addr = self.remote_addr.map(|addr| addr.to_string()).unwrap_or_default();
        let duration_ms = self.connected_for().as_millis() as u64;
        match &reason {
            DisconnectReason::TransportError(e) => {
                warn!(session_id = self.id, player_id = %self.player_id, %remote_addr, duration_ms, error = %e, "session ended with transport error");
            }
            DisconnectReason::ReadTimeout => {
                info!(session_id = self.id, player_id = %self.player_id, %remote_addr, duration_ms, "session timed out");
            }
            _ => {
                debug!(session_id = self.id, player_id = %self.player_id, %remote_addr, duration_ms, %reason, "session ended");
            }
        }
        reason
    }

    async fn apply_frame(&self, game: &GameState, payload: &[u8]) {
        match PlayerUpdate::parse(payload) {
            Ok(update) if update.targets(&self.player_id) => {
                game.apply_update_from(self.id, self.player_id.as_str(), &update).await;
            }
            Ok(update) => {
                trace!(session_id = self.id, player_id = %self.player_id, target = ?update.id, "update for another player dropped");
            }
            Err(e) => {
                trace!(session_id = self.id, error = %e, "malformed update dropped");
            }
        }
    }
}
