//! Error types for the room layer.

use std::path::PathBuf;

use sketchforge_protocol::{PlayerId, RoomId};

/// Errors that can occur during room operations.
///
/// Everything except the word-list variants is a validation failure: it is
/// reported to the requesting connection only and leaves the room untouched.
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    /// The room does not exist.
    #[error("room {0} not found")]
    NotFound(RoomId),

    /// The roster is at `max_players`.
    #[error("room {0} is full")]
    RoomFull(RoomId),

    /// A game is running and the player is not rejoining.
    #[error("game already in progress in room {0}")]
    GameInProgress(RoomId),

    /// Only the admin may start the game.
    #[error("player {0} is not the admin")]
    NotAdmin(PlayerId),

    /// Fewer than `min` players are in the room.
    #[error("need at least {min} players to start")]
    NotEnoughPlayers { min: usize },

    /// No unused room id could be generated.
    #[error("could not allocate a unique room id")]
    IdAllocation,

    /// The room's command channel is full or closed.
    #[error("room {0} is unavailable")]
    Unavailable(RoomId),

    /// A word list had no usable words.
    #[error("word list is empty")]
    EmptyWordList,

    /// A word list file could not be read.
    #[error("failed to read word list {path}: {source}")]
    WordFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl RoomError {
    /// The text shown to the player in `joinError` / `gameError`.
    pub fn client_reason(&self) -> String {
        match self {
            Self::NotFound(_) => "Room not found.".into(),
            Self::RoomFull(_) => "Room is full.".into(),
            Self::GameInProgress(_) => "Game is already in progress.".into(),
            Self::NotAdmin(_) => "Only the admin can start the game.".into(),
            Self::NotEnoughPlayers { min } => {
                format!("Need at least {min} players to start.")
            }
            Self::IdAllocation => "Could not create a room. Try again.".into(),
            Self::Unavailable(_) => "Room is unavailable.".into(),
            Self::EmptyWordList | Self::WordFile { .. } => {
                "Server word list unavailable.".into()
            }
        }
    }
}
