//! Core protocol types for Sketchforge's wire format.
//!
//! Every type here travels "on the wire": it is serialized into an
//! [`Envelope`], sent over a WebSocket, and parsed by the browser client.
//! Field names are camelCase on the wire because the client is JavaScript.

use serde::{Deserialize, Serialize};

use std::fmt;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A player's stable identity, typically a wallet address.
///
/// The coordinator treats this as an opaque string: it never parses it,
/// never checks a signature, never looks up a balance. It only compares
/// identities for equality and uses them as map keys.
///
/// `#[serde(transparent)]` makes `PlayerId("0xabc".into())` serialize as the
/// bare string `"0xabc"` rather than `{ "0": "0xabc" }`.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct PlayerId(pub String);

impl PlayerId {
    /// Creates a player identity from anything string-like.
    pub fn new(identity: impl Into<String>) -> Self {
        Self(identity.into())
    }

    /// Returns the identity as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated form used in chat lines and notices: the first six
    /// characters followed by `...` (e.g. `0x12ab...`).
    pub fn short(&self) -> String {
        let head: String = self.0.chars().take(6).collect();
        format!("{head}...")
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PlayerId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

/// A room's identifier: a short random token handed out by `createRoom`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub String);

impl RoomId {
    /// Creates a room identifier from anything string-like.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RoomId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Recipient — who should receive a message?
// ---------------------------------------------------------------------------

/// Specifies which room members receive a server event.
///
/// Room logic produces `(Recipient, ServerEvent)` pairs; the room actor
/// resolves them against its subscriber list. "Send to one" is just a
/// publish with a single matching subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Recipient {
    /// Every subscribed member of the room.
    All,

    /// One specific member.
    Player(PlayerId),

    /// Everyone except the given member (e.g. stroke fan-out skips the
    /// drawer who produced it).
    AllExcept(PlayerId),
}

// ---------------------------------------------------------------------------
// Channel — delivery guarantees
// ---------------------------------------------------------------------------

/// The delivery guarantee for a message.
///
/// Round state (scores, timers, round results) must arrive in order.
/// Drawing strokes are high-volume and a late or dropped point only
/// costs a slightly rougher line, so they go out as `Unreliable`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "PascalCase")]
pub enum Channel {
    /// Delivered in order, no loss. The default for game events.
    #[default]
    ReliableOrdered,

    /// Delivered (no loss), but may arrive out of order.
    ReliableUnordered,

    /// May be lost, may arrive out of order.
    Unreliable,
}

// ---------------------------------------------------------------------------
// Game value types
// ---------------------------------------------------------------------------

/// Whether a stroke point begins a new line or continues the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StrokeKind {
    Start,
    Draw,
}

/// One line of the scoreboard. Scoreboards travel as an ordered list so
/// the client renders players in join order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreEntry {
    pub player: PlayerId,
    pub score: u32,
}

/// Why a round ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum RoundOutcome {
    /// Someone guessed the word; they are the round winner.
    Guessed { winner: PlayerId },

    /// The countdown reached zero with no correct guess.
    Timeout,

    /// The drawer's grace window expired mid-round.
    DrawerDisconnected,
}

impl fmt::Display for RoundOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Guessed { winner } => write!(f, "guessed by {winner}"),
            Self::Timeout => f.write_str("timeout"),
            Self::DrawerDisconnected => f.write_str("drawer disconnected"),
        }
    }
}

/// Where a room is in its round cycle.
///
/// ```text
/// Idle → RoundActive → RoundEnding → RoundActive → … → GameEnded
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RoomPhase {
    /// Lobby: players are joining, no round has been played.
    Idle,
    /// A round is running: the drawer draws, everyone else guesses.
    RoundActive,
    /// The round result is on screen; the next round starts shortly.
    RoundEnding,
    /// All rounds played (or the game was cut short). Results stay queryable.
    GameEnded,
}

impl fmt::Display for RoomPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("Idle"),
            Self::RoundActive => f.write_str("RoundActive"),
            Self::RoundEnding => f.write_str("RoundEnding"),
            Self::GameEnded => f.write_str("GameEnded"),
        }
    }
}

/// A read-only view of a room for the lobby and results screens.
///
/// Never contains the secret word.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    pub room_id: RoomId,
    pub admin: Option<PlayerId>,
    pub players: Vec<PlayerId>,
    pub scores: Vec<ScoreEntry>,
    pub round: u32,
    pub max_rounds: u32,
    pub game_started: bool,
    pub phase: RoomPhase,
    pub current_drawer: Option<PlayerId>,
    pub is_public: bool,
    /// Seconds left in the current round, when one is running.
    pub time_left: Option<u64>,
}

// ---------------------------------------------------------------------------
// SystemMessage — connection-level plumbing
// ---------------------------------------------------------------------------

/// Messages about the connection itself rather than the game.
///
/// `#[serde(tag = "type")]` produces internally tagged JSON:
/// `{ "type": "Heartbeat", "client_time": 5000 }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SystemMessage {
    /// Client → Server: first frame on every connection. `identity` is
    /// the player identity this connection speaks for from now on.
    Handshake { version: u32, identity: String },

    /// Server → Client: the identity was accepted.
    HandshakeAck {
        player_id: PlayerId,
        server_time: u64,
    },

    /// Either direction: "I'm disconnecting."
    Disconnect { reason: String },

    /// Client → Server: keep-alive.
    Heartbeat { client_time: u64 },

    /// Server → Client: keep-alive echo with the server clock.
    HeartbeatAck {
        client_time: u64,
        server_time: u64,
    },

    /// Server → Client: a connection-level failure (HTTP-style `code`).
    Error { code: u16, message: String },
}

// ---------------------------------------------------------------------------
// ClientEvent — what players ask the coordinator to do
// ---------------------------------------------------------------------------

/// Inbound game events.
///
/// Events that act on behalf of an identity carry it explicitly; the
/// handler rejects any event whose `identity` differs from the one bound
/// at handshake.
///
/// The tag field is `event` rather than `type` because stroke points
/// already use `type` for [`StrokeKind`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ClientEvent {
    CreateRoom { identity: String },
    JoinRoom { room_id: RoomId, identity: String },
    JoinPublicGame { identity: String },
    StartGame { room_id: RoomId },
    Draw {
        room_id: RoomId,
        x: f64,
        y: f64,
        #[serde(rename = "type")]
        kind: StrokeKind,
    },
    Guess {
        room_id: RoomId,
        text: String,
        identity: String,
    },
    QueryRoom { room_id: RoomId },
}

// ---------------------------------------------------------------------------
// ServerEvent — what the coordinator tells players
// ---------------------------------------------------------------------------

/// Outbound game events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ServerEvent {
    RoomCreated { room_id: RoomId },
    JoinedRoom {
        room_id: RoomId,
        players: Vec<PlayerId>,
        scores: Vec<ScoreEntry>,
        admin: Option<PlayerId>,
    },
    JoinError { reason: String },
    PlayersUpdate {
        players: Vec<PlayerId>,
        scores: Vec<ScoreEntry>,
        admin: Option<PlayerId>,
    },
    GameStarted,
    /// Round start. The drawer gets the literal word; everyone else gets
    /// underscores of the same length.
    StartDrawing {
        drawer: PlayerId,
        word: String,
        round: u32,
        max_rounds: u32,
        time_left: u64,
    },
    GuessUpdate { formatted_guess: String },
    Draw {
        x: f64,
        y: f64,
        #[serde(rename = "type")]
        kind: StrokeKind,
    },
    TimeUpdate { time_left: u64 },
    RoundEnd {
        outcome: RoundOutcome,
        word: String,
        scores: Vec<ScoreEntry>,
    },
    GameEnd {
        scores: Vec<ScoreEntry>,
        winner: Option<PlayerId>,
        reason: Option<String>,
    },
    GameCancelled { reason: String },
    GameError { reason: String },
    #[serde(rename = "systemMessage")]
    Notice { text: String },
    RoomState { snapshot: RoomSnapshot },
}

impl ServerEvent {
    /// The delivery channel this event should travel on.
    pub fn channel(&self) -> Channel {
        match self {
            Self::Draw { .. } => Channel::Unreliable,
            _ => Channel::ReliableOrdered,
        }
    }
}

// ---------------------------------------------------------------------------
// Payload & Envelope
// ---------------------------------------------------------------------------

/// The content of a frame.
///
/// `#[serde(tag = "type", content = "data")]` produces adjacently tagged
/// JSON, e.g. `{ "type": "Client", "data": { "event": "startGame", … } }`,
/// so the handler can tell plumbing from game traffic before looking inside.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Payload {
    /// Connection plumbing (handshake, heartbeat, errors).
    System(SystemMessage),

    /// A game event from a player.
    Client(ClientEvent),

    /// A game event from the coordinator.
    Server(ServerEvent),
}

/// The top-level frame. Every message on the wire is an Envelope.
///
/// ```text
/// ┌─────────────────────────────────┐
/// │ seq: 42                         │  ← per-direction ordering
/// │ timestamp: 15000                │  ← ms since connection start
/// │ channel: ReliableOrdered        │  ← delivery guarantee
/// │ ┌─────────────────────────────┐ │
/// │ │ payload: Server(TimeUpdate) │ │
/// │ └─────────────────────────────┘ │
/// └─────────────────────────────────┘
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Auto-incrementing sequence number, one counter per side.
    pub seq: u64,

    /// Milliseconds since the connection was accepted.
    pub timestamp: u64,

    /// Defaults to `ReliableOrdered` when absent.
    #[serde(default)]
    pub channel: Channel,

    pub payload: Payload,
}

// =========================================================================
// Tests
// =========================================================================
