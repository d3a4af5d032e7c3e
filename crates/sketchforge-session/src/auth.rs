//! Identity checks: turning a handshake into a player, and making sure
//! every later event speaks for that same player.
//!
//! The coordinator never validates wallets or signatures; that belongs to
//! the chain layer in front of it. What it does enforce is consistency:
//! a connection that shook hands as `0xA11CE` cannot submit a guess as
//! `0xB0B`.

use sketchforge_protocol::PlayerId;

use crate::SessionError;

/// Longest identity accepted by [`OpaqueIdentity`].
const MAX_IDENTITY_LEN: usize = 128;

/// Validates a handshake identity and returns the player it names.
///
/// `Send + Sync + 'static` because one authenticator is shared by every
/// connection task for the lifetime of the server.
///
/// # Example
///
/// ```rust
/// use sketchforge_protocol::PlayerId;
/// use sketchforge_session::{Authenticator, SessionError};
///
/// /// Only lets hex wallet addresses in.
/// struct HexAddresses;
///
/// impl Authenticator for HexAddresses {
///     async fn authenticate(
///         &self,
///         identity: &str,
///     ) -> Result<PlayerId, SessionError> {
///         let hex = identity.strip_prefix("0x").ok_or_else(|| {
///             SessionError::AuthFailed("expected 0x prefix".into())
///         })?;
///         if hex.is_empty() || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
///             return Err(SessionError::AuthFailed("not hex".into()));
///         }
///         Ok(PlayerId::new(identity.to_ascii_lowercase()))
///     }
/// }
/// ```
pub trait Authenticator: Send + Sync + 'static {
    /// Validates `identity` from the client's handshake.
    ///
    /// # Returns
    /// - `Ok(PlayerId)` — the connection speaks for this player
    /// - `Err(SessionError::AuthFailed)` — reject the connection
    fn authenticate(
        &self,
        identity: &str,
    ) -> impl std::future::Future<Output = Result<PlayerId, SessionError>> + Send;
}

/// Accepts any non-empty identity as-is.
///
/// This is the production default: identities are wallet addresses
/// already checked by the chain layer, and the coordinator only needs
/// them to be stable strings.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpaqueIdentity;

impl Authenticator for OpaqueIdentity {
    async fn authenticate(
        &self,
        identity: &str,
    ) -> Result<PlayerId, SessionError> {
        let identity = identity.trim();
        if identity.is_empty() {
            return Err(SessionError::AuthFailed("identity is empty".into()));
        }
        if identity.len() > MAX_IDENTITY_LEN {
            return Err(SessionError::AuthFailed(format!(
                "identity longer than {MAX_IDENTITY_LEN} bytes"
            )));
        }
        Ok(PlayerId::new(identity))
    }
}

/// Checks that an event's claimed identity matches the connection's.
///
/// The claim is trimmed the same way [`OpaqueIdentity`] trims the
/// handshake, so a client can send the identity string it handshook with.
///
/// # Errors
/// [`SessionError::IdentityMismatch`] if they differ.
pub fn authorize(bound: &PlayerId, claimed: &str) -> Result<(), SessionError> {
    if bound.as_str() == claimed.trim() {
        Ok(())
    } else {
        Err(SessionError::IdentityMismatch {
            bound: bound.clone(),
            claimed: claimed.to_owned(),
        })
    }
}
