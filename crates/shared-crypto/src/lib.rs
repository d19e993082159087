//! # Shared Crypto - Signature Encoding Primitives
//!
//! ## Components
//!
//! | Module | Provides | Use Case |
//! |--------|----------|----------|
//! | `digest` | MD2, MD5, SHA-1, SHA-2 | Local hashing before signing |
//! | `pkcs1` | DigestInfo, block-type-1 padding | RSA signatures without token-side hashing |
//!
//! MD2 and MD5 exist only for verifying and producing legacy RSA signatures.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod digest;
pub mod errors;
pub mod pkcs1;

// Re-exports
pub use digest::{digest, DigestAlgorithm, MessageDigest};
pub use errors::CryptoError;
pub use pkcs1::{digest_info_len, encode_digest_info, Type1Padding};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
