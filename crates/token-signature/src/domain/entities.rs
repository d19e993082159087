//! # Domain Entities
//!
//! Handles and key descriptors exchanged with the token.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Token session identifier.
///
/// Only `SessionLease` hands these to the token; engine code never stores one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session#{}", self.0)
    }
}

/// Token object handle of a key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectHandle(pub u64);

impl fmt::Display for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "object#{}", self.0)
    }
}

/// Sign or verify, fixed at init for one operation cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OperationMode {
    /// Produce a signature with a private key
    Sign,
    /// Check a signature with a public key
    Verify,
}

impl fmt::Display for OperationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationMode::Sign => write!(f, "sign"),
            OperationMode::Verify => write!(f, "verify"),
        }
    }
}

/// Key algorithm family.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyAlgorithm {
    /// RSA
    Rsa,
    /// DSA
    Dsa,
    /// Elliptic curve (ECDSA)
    Ec,
}

impl fmt::Display for KeyAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyAlgorithm::Rsa => write!(f, "RSA"),
            KeyAlgorithm::Dsa => write!(f, "DSA"),
            KeyAlgorithm::Ec => write!(f, "EC"),
        }
    }
}

/// Public or private half of a key pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyClass {
    /// Public key (verification)
    Public,
    /// Private key (signing)
    Private,
}

/// Size-bearing public parameters of a key.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum KeyParameters {
    /// RSA modulus, big-endian
    Rsa {
        /// Modulus n
        modulus: Vec<u8>,
    },
    /// DSA domain prime, big-endian
    Dsa {
        /// Prime p
        prime_p: Vec<u8>,
    },
    /// Elliptic curve field size
    Ec {
        /// Size of the underlying field in bits
        field_bits: usize,
    },
}

/// A key that lives on the token.
///
/// The engine references the key by handle; the key material itself never
/// leaves the token.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TokenKey {
    handle: ObjectHandle,
    class: KeyClass,
    params: KeyParameters,
}

impl TokenKey {
    /// Describe a token key.
    pub fn new(handle: ObjectHandle, class: KeyClass, params: KeyParameters) -> Self {
        Self {
            handle,
            class,
            params,
        }
    }

    /// Object handle on the token.
    pub fn handle(&self) -> ObjectHandle {
        self.handle
    }

    /// Public or private.
    pub fn class(&self) -> KeyClass {
        self.class
    }

    /// Size-bearing parameters.
    pub fn params(&self) -> &KeyParameters {
        &self.params
    }

    /// Algorithm family.
    pub fn algorithm(&self) -> KeyAlgorithm {
        match self.params {
            KeyParameters::Rsa { .. } => KeyAlgorithm::Rsa,
            KeyParameters::Dsa { .. } => KeyAlgorithm::Dsa,
            KeyParameters::Ec { .. } => KeyAlgorithm::Ec,
        }
    }

    /// Key size in bits: modulus length (RSA), prime P length (DSA) or
    /// field size (EC).
    pub fn key_bits(&self) -> usize {
        match &self.params {
            KeyParameters::Rsa { modulus } => bit_length(modulus),
            KeyParameters::Dsa { prime_p } => bit_length(prime_p),
            KeyParameters::Ec { field_bits } => *field_bits,
        }
    }

    /// Key size rounded up to whole bytes.
    pub fn key_bytes(&self) -> usize {
        (self.key_bits() + 7) >> 3
    }
}

/// Bit length of a big-endian unsigned magnitude.
pub fn bit_length(magnitude: &[u8]) -> usize {
    match magnitude.iter().position(|&b| b != 0) {
        Some(i) => (magnitude.len() - i - 1) * 8 + (8 - magnitude[i].leading_zeros() as usize),
        None => 0,
    }
}

/// Key size bounds the token advertises for a mechanism.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MechanismInfo {
    /// Smallest supported key, in bits
    pub min_key_bits: Option<usize>,
    /// Largest supported key, in bits
    pub max_key_bits: Option<usize>,
}

impl MechanismInfo {
    /// Bounds with both ends set.
    pub fn bounded(min_key_bits: usize, max_key_bits: usize) -> Self {
        Self {
            min_key_bits: Some(min_key_bits),
            max_key_bits: Some(max_key_bits),
        }
    }
}
