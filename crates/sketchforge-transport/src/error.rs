#[cfg(feature = "websocket")]
use tokio_tungstenite::tungstenite;

use crate::ConnectionId;

/// Errors from binding a listener, accepting peers, or moving frames.
///
/// Only [`Bind`](Self::Bind) is fatal to a server. Everything else ends
/// one connection and leaves the listener running.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The listener could not take its address.
    #[error("could not bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// The OS refused to hand over an incoming TCP connection.
    #[error("accept failed: {0}")]
    Accept(#[source] std::io::Error),

    /// A peer opened TCP but never finished the WebSocket upgrade.
    #[cfg(feature = "websocket")]
    #[error("websocket upgrade failed: {0}")]
    Upgrade(#[source] tungstenite::Error),

    /// The peer is gone; nothing more can be sent on this connection.
    #[error("{0} closed")]
    ConnectionClosed(ConnectionId),

    /// Any other protocol or I/O failure on an open WebSocket.
    #[cfg(feature = "websocket")]
    #[error("websocket error: {0}")]
    WebSocket(#[source] tungstenite::Error),
}
