//! TCP listener used by the HTTP server.
//!
//! Accept errors never end the server. Errors that belong to a single
//! half-open connection are skipped; anything else (running out of file
//! descriptors, for example) is logged and retried after a short pause so the
//! sessions already running are left alone.

use axum::serve::Listener;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error};

/// Pause before accepting again after a resource error such as EMFILE.
pub const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// A [`TcpListener`] that retries failed accepts and sets `TCP_NODELAY` on
/// every accepted stream.
#[derive(Debug)]
pub struct RelayListener {
    inner: TcpListener,
}

impl RelayListener {
    pub fn new(inner: TcpListener) -> Self {
        Self { inner }
    }
}

impl Listener for RelayListener {
    type Io = TcpStream;
    type Addr = SocketAddr;

    async fn accept(&mut self) -> (Self::Io, Self::Addr) {
        let listener = &self.inner;
        let (stream, addr) = accept_with_retry(|| listener.accept()).await;
        if let Err(e) = stream.set_nodelay(true) {
            debug!(remote_addr = %addr, error = %e, "failed to set TCP_NODELAY");
        }
        (stream, addr)
    }

    fn local_addr(&self) -> io::Result<Self::Addr> {
        self.inner.local_addr()
    }
}

/// Calls `accept` until it succeeds.
pub async fn accept_with_retry<T, F, Fut>(mut accept: F) -> T
where
    F: FnMut() -> Fut,
    Fut: Future<Output = io::Result<T>>,
{
    loop {
        match accept().await {
            Ok(accepted) => return accepted,
            Err(e) => match retry_delay(&e) {
                None => debug!(error = %e, "connection dropped during accept"),
                Some(delay) => {
                    error!(error = %e, backoff_ms = delay.as_millis() as u64, "accept failed, retrying");
                    tokio::time::sleep(delay).await;
                }
            },
        }
    }
}

fn retry_delay(error: &io::Error) -> Option<Duration> {
    match error.kind() {
        io::ErrorKind::ConnectionRefused
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::Interrupted => None,
        _ => Some(ACCEPT_BACKOFF),
    }
}
