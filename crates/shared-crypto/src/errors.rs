//! Crypto error types.

use thiserror::Error;

/// Errors from the shared encoding primitives.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CryptoError {
    /// Payload does not fit in the padded block
    #[error("Data too long for padding: {len} bytes, max {max}")]
    DataTooLong {
        /// Payload length in bytes
        len: usize,
        /// Largest payload the block can carry
        max: usize,
    },

    /// Modulus too small to carry any padding
    #[error("Padded size must be at least {min} bytes, got {size}")]
    PaddedSizeTooSmall {
        /// Requested padded size in bytes
        size: usize,
        /// Minimum padded size in bytes
        min: usize,
    },

    /// Block does not carry valid block-type-1 padding
    #[error("Invalid PKCS#1 padding")]
    InvalidPadding,

    /// DER encoding failed
    #[error("DER encoding failed: {0}")]
    Der(#[from] der::Error),
}
