//! # Inbound Ports (Driving Ports / API)
//!
//! The init → update* → finish cycle callers drive.

use crate::domain::entities::TokenKey;
use crate::domain::errors::EngineError;

/// A reusable signature operation bound to one algorithm.
///
/// One instance runs one operation at a time; callers serialize access.
pub trait SignatureOperation {
    /// Bind a private key and start a signing cycle.
    ///
    /// # Errors
    /// * `InvalidKey` - key rejected; the operation is left uninitialized
    /// * `ResourceExhausted` - no token session available
    fn init_sign(&mut self, key: &TokenKey) -> Result<(), EngineError>;

    /// Bind a public key and start a verification cycle.
    ///
    /// # Errors
    /// Same as [`SignatureOperation::init_sign`].
    fn init_verify(&mut self, key: &TokenKey) -> Result<(), EngineError>;

    /// Feed message bytes. Re-initializes with the last key and mode if no
    /// cycle is active.
    fn update(&mut self, data: &[u8]) -> Result<(), EngineError>;

    /// Finish a signing cycle. DSA and ECDSA signatures are DER encoded.
    fn sign(&mut self) -> Result<Vec<u8>, EngineError>;

    /// Finish a verification cycle.
    ///
    /// Returns `Ok(false)` for a signature that is malformed or does not
    /// verify; errors are reserved for token faults.
    fn verify(&mut self, signature: &[u8]) -> Result<bool, EngineError>;
}
