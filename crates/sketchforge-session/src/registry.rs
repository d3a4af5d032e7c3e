//! The Connection Registry: which connection speaks for each player.
//!
//! At most one connection is live per identity. A newer handshake for the
//! same identity supersedes the older binding, and the server evicts the
//! older socket. When that socket finally closes, its close must not tear
//! down the newer binding, so [`unbind`](ConnectionRegistry::unbind) only
//! removes a binding it still owns.

use std::collections::HashMap;
use std::time::Instant;

use sketchforge_protocol::PlayerId;
use sketchforge_transport::ConnectionId;

use crate::Session;

/// Maps player identities to their live connection.
///
/// Not thread-safe on its own; the server wraps it in a `Mutex`.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    sessions: HashMap<PlayerId, Session>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `connection` the live connection for `player`.
    ///
    /// Returns the session that was superseded, if the player was already
    /// bound to another connection. The caller is expected to shut that
    /// connection down.
    pub fn bind(
        &mut self,
        player: PlayerId,
        connection: ConnectionId,
    ) -> Option<Session> {
        let session = Session {
            player_id: player.clone(),
            connection,
            bound_at: Instant::now(),
        };
        let previous = self
            .sessions
            .insert(player.clone(), session)
            .filter(|old| old.connection != connection);

        match &previous {
            Some(old) => tracing::info!(
                %player,
                old = %old.connection,
                new = %connection,
                "connection superseded"
            ),
            None => tracing::debug!(%player, %connection, "connection bound"),
        }
        previous
    }

    /// Removes the binding if `connection` is still the live one.
    ///
    /// Returns `true` when the binding was removed, `false` when the
    /// identity had already moved to a newer connection (or was never
    /// bound). Either way the close is still the room's to judge: the room
    /// knows which connection its subscription belongs to.
    pub fn unbind(&mut self, player: &PlayerId, connection: ConnectionId) -> bool {
        if !self.is_live(player, connection) {
            tracing::debug!(%player, %connection, "stale connection closed");
            return false;
        }
        self.sessions.remove(player);
        tracing::debug!(%player, %connection, "connection unbound");
        true
    }

    /// Whether `connection` is the live connection for `player`.
    ///
    /// A connection that is no longer live has lost its authority to act
    /// for the player.
    pub fn is_live(&self, player: &PlayerId, connection: ConnectionId) -> bool {
        self.sessions
            .get(player)
            .is_some_and(|s| s.connection == connection)
    }

    /// Number of identities with a live connection.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
