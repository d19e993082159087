//! # Token Mechanisms
//!
//! PKCS#11 mechanism identifiers the signature engine drives.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A token mechanism identifier (`CKM_*`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Mechanism(pub u64);

impl Mechanism {
    /// PKCS#1 v1.5 RSA, caller supplies DigestInfo
    pub const RSA_PKCS: Mechanism = Mechanism(0x0001);
    /// Raw RSA, caller supplies the full padded block
    pub const RSA_X_509: Mechanism = Mechanism(0x0003);
    /// MD2 + PKCS#1 v1.5 RSA
    pub const MD2_RSA_PKCS: Mechanism = Mechanism(0x0004);
    /// MD5 + PKCS#1 v1.5 RSA
    pub const MD5_RSA_PKCS: Mechanism = Mechanism(0x0005);
    /// SHA-1 + PKCS#1 v1.5 RSA
    pub const SHA1_RSA_PKCS: Mechanism = Mechanism(0x0006);
    /// DSA over a caller-supplied digest
    pub const DSA: Mechanism = Mechanism(0x0011);
    /// SHA-1 + DSA
    pub const DSA_SHA1: Mechanism = Mechanism(0x0012);
    /// SHA-256 + PKCS#1 v1.5 RSA
    pub const SHA256_RSA_PKCS: Mechanism = Mechanism(0x0040);
    /// SHA-384 + PKCS#1 v1.5 RSA
    pub const SHA384_RSA_PKCS: Mechanism = Mechanism(0x0041);
    /// SHA-512 + PKCS#1 v1.5 RSA
    pub const SHA512_RSA_PKCS: Mechanism = Mechanism(0x0042);
    /// SHA-224 + PKCS#1 v1.5 RSA
    pub const SHA224_RSA_PKCS: Mechanism = Mechanism(0x0046);
    /// ECDSA over a caller-supplied digest
    pub const ECDSA: Mechanism = Mechanism(0x1041);
    /// SHA-1 + ECDSA
    pub const ECDSA_SHA1: Mechanism = Mechanism(0x1042);

    /// The `CKM_*` name, if this is a mechanism the engine knows.
    pub fn name(&self) -> Option<&'static str> {
        let name = match *self {
            Self::RSA_PKCS => "CKM_RSA_PKCS",
            Self::RSA_X_509 => "CKM_RSA_X_509",
            Self::MD2_RSA_PKCS => "CKM_MD2_RSA_PKCS",
            Self::MD5_RSA_PKCS => "CKM_MD5_RSA_PKCS",
            Self::SHA1_RSA_PKCS => "CKM_SHA1_RSA_PKCS",
            Self::DSA => "CKM_DSA",
            Self::DSA_SHA1 => "CKM_DSA_SHA1",
            Self::SHA256_RSA_PKCS => "CKM_SHA256_RSA_PKCS",
            Self::SHA384_RSA_PKCS => "CKM_SHA384_RSA_PKCS",
            Self::SHA512_RSA_PKCS => "CKM_SHA512_RSA_PKCS",
            Self::SHA224_RSA_PKCS => "CKM_SHA224_RSA_PKCS",
            Self::ECDSA => "CKM_ECDSA",
            Self::ECDSA_SHA1 => "CKM_ECDSA_SHA1",
            _ => return None,
        };
        Some(name)
    }
}

impl fmt::Display for Mechanism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "0x{:08X}", self.0),
        }
    }
}
