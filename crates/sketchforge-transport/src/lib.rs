//! Socket layer for Sketchforge.
//!
//! The server only ever sees [`Connection`]s: frames in, frames out, and a
//! [`ConnectionId`] naming the socket.
//!
//! - Game events travel on [`Connection::send`], reliable and ordered.
//! - Drawing strokes travel on [`Connection::send_unreliable`].
//! - The id tells a reconnecting player's old socket from the new one.
//!
//! # Feature Flags
//!
//! - `websocket` (default): WebSocket transport via `tokio-tungstenite`

#![allow(async_fn_in_trait)]

mod error;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConnection, WebSocketTransport};

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque identifier for a single transport connection.
///
/// A player identity outlives its connections: when a browser tab reloads,
/// the same identity comes back on a new `ConnectionId`. Rooms remember
/// which connection a player disconnected on so that a late close of an
/// old connection can't evict a player who already came back.
///
/// Ids handed out by [`ConnectionId::next`] are unique for the process and
/// increase in accept order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Wraps a raw id. Tests use this to name connections directly.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// A fresh id, larger than every id handed out before it.
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// A listener that yields upgraded player connections.
pub trait Transport: Send + Sync + 'static {
    type Connection: Connection;
    type Error: std::error::Error + Send + Sync;

    /// Waits for the next peer. An error concerns that one peer only; the
    /// caller keeps accepting.
    async fn accept(&mut self) -> Result<Self::Connection, Self::Error>;
}

/// One player's socket.
///
/// Every method takes `&self`: the server reads from a connection in its
/// handler task while a separate writer task pushes room events into it,
/// so implementations lock their read and write halves independently.
pub trait Connection: Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync;

    /// Sends one frame reliably and in order. Handshake replies, round
    /// events and errors go through here.
    async fn send(&self, data: &[u8]) -> Result<(), Self::Error>;

    /// Receives the next frame. Only one task reads a connection.
    ///
    /// Returns `Ok(None)` once the peer has closed the connection.
    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error>;

    /// Sends a frame where loss or reordering is acceptable.
    ///
    /// Drawing strokes go through here: a stroke point that arrives late is
    /// worth less than the next one. Defaults to [`send`](Self::send) for
    /// transports without a datagram path.
    async fn send_unreliable(
        &self,
        data: &[u8],
    ) -> Result<(), Self::Error> {
        self.send(data).await
    }

    /// Closes the connection from the server side, for example when a newer
    /// connection has taken over the player's identity.
    async fn close(&self) -> Result<(), Self::Error>;

    /// The id this connection was accepted under. Stable for its lifetime.
    fn id(&self) -> ConnectionId;
}
