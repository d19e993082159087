//! # Message Digests
//!
//! Streaming digest primitives for the hash-then-sign signature schemes.
//!
//! | Algorithm | Output | DigestInfo length |
//! |-----------|--------|-------------------|
//! | MD2       | 16     | 34                |
//! | MD5       | 16     | 34                |
//! | SHA-1     | 20     | 35                |
//! | SHA-224   | 28     | 47                |
//! | SHA-256   | 32     | 51                |
//! | SHA-384   | 48     | 67                |
//! | SHA-512   | 64     | 83                |

use der::asn1::ObjectIdentifier;
use sha2::digest::DynDigest;
use std::fmt;
use zeroize::Zeroizing;

/// Digest algorithms usable by the signature engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DigestAlgorithm {
    /// MD2 (RFC 1319), kept for legacy RSA signatures.
    Md2,
    /// MD5 (RFC 1321), kept for legacy RSA signatures.
    Md5,
    /// SHA-1
    Sha1,
    /// SHA-224
    Sha224,
    /// SHA-256
    Sha256,
    /// SHA-384
    Sha384,
    /// SHA-512
    Sha512,
}

impl DigestAlgorithm {
    /// Digest output length in bytes.
    pub const fn output_len(self) -> usize {
        match self {
            Self::Md2 | Self::Md5 => 16,
            Self::Sha1 => 20,
            Self::Sha224 => 28,
            Self::Sha256 => 32,
            Self::Sha384 => 48,
            Self::Sha512 => 64,
        }
    }

    /// OBJECT IDENTIFIER naming the algorithm in a DigestInfo.
    pub const fn oid(self) -> ObjectIdentifier {
        match self {
            Self::Md2 => ObjectIdentifier::new_unwrap("1.2.840.113549.2.2"),
            Self::Md5 => ObjectIdentifier::new_unwrap("1.2.840.113549.2.5"),
            Self::Sha1 => ObjectIdentifier::new_unwrap("1.3.14.3.2.26"),
            Self::Sha224 => ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.4"),
            Self::Sha256 => ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.1"),
            Self::Sha384 => ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.2"),
            Self::Sha512 => ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.3"),
        }
    }

    /// Display name.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Md2 => "MD2",
            Self::Md5 => "MD5",
            Self::Sha1 => "SHA-1",
            Self::Sha224 => "SHA-224",
            Self::Sha256 => "SHA-256",
            Self::Sha384 => "SHA-384",
            Self::Sha512 => "SHA-512",
        }
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Stateful message digest.
///
/// `finalize_reset` leaves the digest ready for the next message, so a single
/// instance can serve many sign/verify cycles.
pub struct MessageDigest {
    algorithm: DigestAlgorithm,
    inner: Box<dyn DynDigest + Send + Sync>,
}

impl MessageDigest {
    /// Create a fresh digest for `algorithm`.
    pub fn new(algorithm: DigestAlgorithm) -> Self {
        let inner: Box<dyn DynDigest + Send + Sync> = match algorithm {
            DigestAlgorithm::Md2 => Box::new(md2::Md2::default()),
            DigestAlgorithm::Md5 => Box::new(md5::Md5::default()),
            DigestAlgorithm::Sha1 => Box::new(sha1::Sha1::default()),
            DigestAlgorithm::Sha224 => Box::new(sha2::Sha224::default()),
            DigestAlgorithm::Sha256 => Box::new(sha2::Sha256::default()),
            DigestAlgorithm::Sha384 => Box::new(sha2::Sha384::default()),
            DigestAlgorithm::Sha512 => Box::new(sha2::Sha512::default()),
        };
        Self { algorithm, inner }
    }

    /// The algorithm this digest computes.
    pub fn algorithm(&self) -> DigestAlgorithm {
        self.algorithm
    }

    /// Update with data.
    pub fn update(&mut self, data: &[u8]) -> &mut Self {
        self.inner.update(data);
        self
    }

    /// Finalize, return the digest and reset for reuse.
    pub fn finalize_reset(&mut self) -> Zeroizing<Vec<u8>> {
        Zeroizing::new(self.inner.finalize_reset().into_vec())
    }

    /// Discard any absorbed input.
    pub fn reset(&mut self) {
        self.inner.reset();
    }
}

impl fmt::Debug for MessageDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageDigest")
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

/// Hash data in one shot.
pub fn digest(algorithm: DigestAlgorithm, data: &[u8]) -> Zeroizing<Vec<u8>> {
    let mut md = MessageDigest::new(algorithm);
    md.update(data);
    md.finalize_reset()
}
