//! Error types for the session layer.

use sketchforge_protocol::PlayerId;

/// Errors that can occur while establishing or checking a player identity.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The handshake identity was rejected by the
    /// [`Authenticator`](crate::Authenticator).
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// An event claimed an identity other than the one bound to the
    /// connection that sent it.
    #[error("authentication error: connection is bound to {bound}, event claims {claimed}")]
    IdentityMismatch { bound: PlayerId, claimed: String },
}
