//! The record of one identity bound to one live connection.

use std::time::Instant;

use sketchforge_protocol::PlayerId;
use sketchforge_transport::ConnectionId;

/// A player's binding to a live transport connection.
///
/// Created at handshake. Replaced when the same identity completes a
/// handshake on a newer connection, removed when the live connection
/// closes.
#[derive(Debug, Clone)]
pub struct Session {
    /// Which player this binding belongs to.
    pub player_id: PlayerId,

    /// The connection currently speaking for the player.
    pub connection: ConnectionId,

    /// When the binding was made.
    pub bound_at: Instant,
}
