//! Player identity and connection binding for Sketchforge.
//!
//! This crate answers two questions for the layers above it:
//!
//! 1. **Who is this connection?** — the [`Authenticator`] turns the
//!    handshake identity into a [`PlayerId`](sketchforge_protocol::PlayerId),
//!    and [`authorize`] rejects events that claim somebody else.
//! 2. **Which connection is this player on right now?** — the
//!    [`ConnectionRegistry`] maps each identity to its live connection.
//!
//! # How it fits in the stack
//!
//! ```text
//! Room Layer (above)  ← told about every close, judges staleness itself
//!     ↕
//! Session Layer (this crate)  ← identity ↔ connection
//!     ↕
//! Protocol / Transport (below)  ← PlayerId, ConnectionId
//! ```

#![allow(async_fn_in_trait)]

mod auth;
mod error;
mod registry;
mod session;

pub use auth::{Authenticator, OpaqueIdentity, authorize};
pub use error::SessionError;
pub use registry::ConnectionRegistry;
pub use session::Session;
