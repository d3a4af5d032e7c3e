//! Unified error type for the Sketchforge server.

use sketchforge_protocol::ProtocolError;
use sketchforge_room::RoomError;
use sketchforge_session::SessionError;
use sketchforge_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant auto-generates `From` impls,
/// so the `?` operator converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum SketchError {
    /// A transport-level error (bind, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, bad handshake).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session-level error (identity rejected or mismatched).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A room-level error (not found, full, word list unreadable).
    #[error(transparent)]
    Room(#[from] RoomError),
}
