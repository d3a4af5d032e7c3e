//! Wire protocol for Sketchforge.
//!
//! This crate defines what clients and the coordinator say to each other:
//!
//! - **Types** ([`Envelope`], [`ClientEvent`], [`ServerEvent`],
//!   [`SystemMessage`], …) — the structures that travel on the wire.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]) — how those structures
//!   become bytes and back.
//! - **Errors** ([`ProtocolError`]) — what can go wrong doing so.
//!
//! # Architecture
//!
//! The protocol layer sits between transport (raw frames) and the game
//! layers. It knows nothing about connections or rooms.
//!
//! ```text
//! Transport (bytes) → Protocol (Envelope) → Session / Room
//! ```

mod codec;
mod error;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use types::{
    Channel, ClientEvent, Envelope, Payload, PlayerId, Recipient, RoomId,
    RoomPhase, RoomSnapshot, RoundOutcome, ScoreEntry, ServerEvent,
    StrokeKind, SystemMessage,
};
