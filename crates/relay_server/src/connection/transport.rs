//! Outbound half of a client connection.
//!
//! Every session owns a [`Connection`]: a bounded outbound queue drained by a
//! dedicated writer task, plus a close signal shared by the reader, the writer
//! and the hub. Closing the connection is the only way one party cancels the
//! others; there is no separate cancellation token.

use axum::extract::ws::{close_code, CloseFrame, Message};
use futures::{Sink, SinkExt};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};
use tracing::{debug, trace, warn};

/// Reasons a message could not be queued for a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    /// The writer task is too far behind; the client is not keeping up
    #[error("outbound queue full")]
    Full,

    /// The connection has been closed
    #[error("connection closed")]
    Closed,
}

/// Cloneable handle used to queue frames for a client and to close it.
#[derive(Debug, Clone)]
pub struct Connection {
    outbound: mpsc::Sender<Message>,
    closed: Arc<watch::Sender<bool>>,
}

/// The writer task's end of a [`Connection`].
#[derive(Debug)]
pub struct ConnectionIo {
    outbound: mpsc::Receiver<Message>,
    connection: Connection,
}

impl Connection {
    /// Creates a connection whose outbound queue holds at most `queue_size`
    /// frames.
    pub fn new(queue_size: usize) -> (Self, ConnectionIo) {
        let (outbound_tx, outbound_rx) = mpsc::channel(queue_size.max(1));
        let (closed_tx, _) = watch::channel(false);
        let connection = Self {
            outbound: outbound_tx,
            closed: Arc::new(closed_tx),
        };
        let io = ConnectionIo {
            outbound: outbound_rx,
            connection: connection.clone(),
        };
        (connection, io)
    }

    /// Queues a frame without waiting.
    pub fn try_send(&self, message: Message) -> Result<(), SendError> {
        if self.is_closed() {
            return Err(SendError::Closed);
        }
        self.outbound.try_send(message).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SendError::Full,
            mpsc::error::TrySendError::Closed(_) => SendError::Closed,
        })
    }

    /// Closes the connection. Returns true for the call that actually closed
    /// it; later calls are no-ops.
    pub fn close(&self) -> bool {
        !self.closed.send_replace(true)
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Resolves once the connection has been closed by any party.
    pub async fn closed(&self) {
        let mut signal = self.closed.subscribe();
        loop {
            let closed = *signal.borrow_and_update();
            if closed {
                return;
            }
            // The sender lives as long as `self`, so this never errors here.
            if signal.changed().await.is_err() {
                return;
            }
        }
    }
}

impl ConnectionIo {
    /// Takes the next queued frame, or `None` once every [`Connection`] handle
    /// is gone and the queue is empty.
    pub async fn next_message(&mut self) -> Option<Message> {
        self.outbound.recv().await
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }
}

/// Drains `io`'s queue into `sink` until the connection closes or a write
/// fails.
///
/// Each write is bounded by `write_timeout`; a failed or timed-out write closes
/// the connection. A ping is sent every `ping_interval` so an idle client keeps
/// answering with pongs. On exit a Close frame is sent on a best-effort basis
/// and the sink is closed.
pub async fn write_loop<W, E>(
    mut sink: W,
    io: ConnectionIo,
    write_timeout: Duration,
    ping_interval: Duration,
) where
    W: Sink<Message, Error = E> + Unpin,
    E: fmt::Display,
{
    let ConnectionIo {
        mut outbound,
        connection,
    } = io;
    let mut ping = interval_at(Instant::now() + ping_interval, ping_interval);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let message = tokio::select! {
            _ = connection.closed() => break,
            message = outbound.recv() => match message {
                Some(message) => message,
                None => break,
            },
            _ = ping.tick() => Message::Ping(Default::default()),
        };

        match timeout(write_timeout, sink.send(message)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                debug!(error = %e, "write failed, closing connection");
                break;
            }
            Err(_) => {
                warn!(timeout_ms = write_timeout.as_millis() as u64, "write timed out, closing connection");
                break;
            }
        }
    }

    connection.close();
    let close_frame = Message::Close(Some(CloseFrame {
        code: close_code::NORMAL,
        reason: "closing".into(),
    }));
    let shutdown = async {
        sink.send(close_frame).await?;
        sink.close().await
    };
    if let Ok(Err(e)) = timeout(write_timeout, shutdown).await {
        trace!(error = %e, "close handshake not completed");
    }
}
