//! # Outbound Ports (Driven Ports / SPI)
//!
//! The token primitives the signature engine drives. Every call is
//! synchronous and blocks for the duration of the token operation.

use crate::domain::entities::{MechanismInfo, ObjectHandle, SessionId};
use crate::domain::errors::TokenError;
use crate::domain::mechanism::Mechanism;

/// A session-oriented cryptographic token.
///
/// Mirrors the PKCS#11 signing and verification primitives. A session holds
/// at most one active operation; `sign`, `sign_final`, `verify` and
/// `verify_final` end it whether they succeed or fail.
pub trait Token: Send + Sync {
    /// Open a new session.
    ///
    /// # Errors
    /// `SessionCount` when the token has no sessions left.
    fn open_session(&self) -> Result<SessionId, TokenError>;

    /// Close a session, aborting any active operation.
    fn close_session(&self, session: SessionId) -> Result<(), TokenError>;

    /// True if objects created in `session` would die with it.
    ///
    /// Such sessions cannot be killed to abort an operation.
    fn session_has_objects(&self, _session: SessionId) -> bool {
        false
    }

    /// Key size bounds for `mechanism`, `None` if the token advertises none.
    fn mechanism_info(&self, mechanism: Mechanism) -> Result<Option<MechanismInfo>, TokenError>;

    // =========================================================================
    // Signing
    // =========================================================================

    /// `C_SignInit`
    fn sign_init(
        &self,
        session: SessionId,
        mechanism: Mechanism,
        key: ObjectHandle,
    ) -> Result<(), TokenError>;

    /// `C_SignUpdate`
    fn sign_update(&self, session: SessionId, data: &[u8]) -> Result<(), TokenError>;

    /// `C_SignFinal`; `expected_len` is a length hint, 0 if unknown.
    fn sign_final(&self, session: SessionId, expected_len: usize) -> Result<Vec<u8>, TokenError>;

    /// `C_Sign`: single-part signature over `data`.
    fn sign(&self, session: SessionId, data: &[u8]) -> Result<Vec<u8>, TokenError>;

    // =========================================================================
    // Verification
    // =========================================================================

    /// `C_VerifyInit`
    fn verify_init(
        &self,
        session: SessionId,
        mechanism: Mechanism,
        key: ObjectHandle,
    ) -> Result<(), TokenError>;

    /// `C_VerifyUpdate`
    fn verify_update(&self, session: SessionId, data: &[u8]) -> Result<(), TokenError>;

    /// `C_VerifyFinal`
    ///
    /// # Errors
    /// `SignatureInvalid` / `SignatureLenRange` when the signature does not
    /// verify.
    fn verify_final(&self, session: SessionId, signature: &[u8]) -> Result<(), TokenError>;

    /// `C_Verify`: single-part verification of `signature` over `data`.
    fn verify(&self, session: SessionId, data: &[u8], signature: &[u8])
        -> Result<(), TokenError>;
}
