//! # Sketchforge
//!
//! Server-authoritative coordinator for a multi-room drawing-and-guessing
//! game.
//!
//! Players connect over WebSocket, bind an opaque identity at handshake,
//! and then create, join, and play rooms. Each room runs as its own task
//! with server-side round timers, scoring, and a reconnect grace window;
//! finished games are handed to a [`WinnerReporter`] for payout outside
//! this process.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sketchforge::prelude::*;
//!
//! # async fn run() -> Result<(), SketchError> {
//! let server = SketchServer::builder()
//!     .bind("0.0.0.0:3001")
//!     .build(OpaqueIdentity)
//!     .await?;
//! server.run().await
//! # }
//! ```

mod error;
mod escrow;
mod handler;
mod server;

pub use error::SketchError;
pub use escrow::WinnerReporter;
pub use server::{
    DEFAULT_IDLE_TIMEOUT, PROTOCOL_VERSION, SketchServer, SketchServerBuilder,
};

/// Everything needed to configure and run a server, plus the wire types
/// a client or test speaks.
pub mod prelude {
    pub use crate::{
        DEFAULT_IDLE_TIMEOUT, PROTOCOL_VERSION, SketchError, SketchServer,
        SketchServerBuilder, WinnerReporter,
    };
    pub use sketchforge_protocol::{
        Channel, ClientEvent, Codec, Envelope, JsonCodec, Payload, PlayerId,
        RoomId, RoomPhase, RoomSnapshot, RoundOutcome, ScoreEntry,
        ServerEvent, StrokeKind, SystemMessage,
    };
    pub use sketchforge_room::{
        DrawerPolicy, GameConfig, ScoringPolicy, TimeOfDay, WordBank,
    };
    pub use sketchforge_session::{
        Authenticator, OpaqueIdentity, SessionError,
    };
}
