//! # Algorithm Resolution
//!
//! Maps an (algorithm name, mechanism) pair onto the processing strategy the
//! engine uses for the lifetime of an instance.
//!
//! | Mechanism                 | Algorithms                 | Processing         |
//! |---------------------------|----------------------------|--------------------|
//! | `CKM_<digest>_RSA_PKCS`   | `<digest>withRSA`          | stream to token    |
//! | `CKM_DSA_SHA1`            | `SHA1withDSA`              | stream to token    |
//! | `CKM_ECDSA_SHA1`          | `SHA1withECDSA`            | stream to token    |
//! | `CKM_DSA`                 | `SHA1withDSA`              | digest locally     |
//! | `CKM_DSA`                 | `NONEwithDSA`              | raw, exactly 20 B  |
//! | `CKM_ECDSA`               | `SHA*withECDSA`            | digest locally     |
//! | `CKM_ECDSA`               | `NONEwithECDSA`            | raw, at most 128 B |
//! | `CKM_RSA_PKCS`            | `<digest>withRSA`          | digest + DigestInfo|
//! | `CKM_RSA_X_509`           | `<digest>withRSA`          | digest + DigestInfo + PKCS#1 pad |

use super::entities::KeyAlgorithm;
use super::errors::EngineError;
use super::mechanism::Mechanism;
use der::asn1::ObjectIdentifier;
use shared_crypto::DigestAlgorithm;
use std::fmt;
use std::str::FromStr;

/// Raw DSA input: exactly one SHA-1 sized digest.
pub const RAW_DSA_LEN: usize = 20;

/// Upper bound on raw ECDSA input (1024 bits).
pub const RAW_ECDSA_MAX: usize = 128;

/// Signature length hint passed to `C_SignFinal` for streamed DSA (r || s).
pub const DSA_SIGNATURE_LEN: usize = 40;

/// Named signature algorithms.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SignatureAlgorithm {
    /// DSA over a caller-supplied 20-byte digest (alias `RawDSA`)
    NoneWithDsa,
    /// SHA-1 + DSA (alias `DSA`)
    Sha1WithDsa,
    /// MD2 + RSA
    Md2WithRsa,
    /// MD5 + RSA
    Md5WithRsa,
    /// SHA-1 + RSA
    Sha1WithRsa,
    /// SHA-224 + RSA
    Sha224WithRsa,
    /// SHA-256 + RSA
    Sha256WithRsa,
    /// SHA-384 + RSA
    Sha384WithRsa,
    /// SHA-512 + RSA
    Sha512WithRsa,
    /// ECDSA over caller-supplied data
    NoneWithEcdsa,
    /// SHA-1 + ECDSA
    Sha1WithEcdsa,
    /// SHA-224 + ECDSA
    Sha224WithEcdsa,
    /// SHA-256 + ECDSA
    Sha256WithEcdsa,
    /// SHA-384 + ECDSA
    Sha384WithEcdsa,
    /// SHA-512 + ECDSA
    Sha512WithEcdsa,
}

impl SignatureAlgorithm {
    /// Canonical name.
    pub const fn name(self) -> &'static str {
        match self {
            Self::NoneWithDsa => "NONEwithDSA",
            Self::Sha1WithDsa => "SHA1withDSA",
            Self::Md2WithRsa => "MD2withRSA",
            Self::Md5WithRsa => "MD5withRSA",
            Self::Sha1WithRsa => "SHA1withRSA",
            Self::Sha224WithRsa => "SHA224withRSA",
            Self::Sha256WithRsa => "SHA256withRSA",
            Self::Sha384WithRsa => "SHA384withRSA",
            Self::Sha512WithRsa => "SHA512withRSA",
            Self::NoneWithEcdsa => "NONEwithECDSA",
            Self::Sha1WithEcdsa => "SHA1withECDSA",
            Self::Sha224WithEcdsa => "SHA224withECDSA",
            Self::Sha256WithEcdsa => "SHA256withECDSA",
            Self::Sha384WithEcdsa => "SHA384withECDSA",
            Self::Sha512WithEcdsa => "SHA512withECDSA",
        }
    }

    /// Key family the algorithm signs with.
    pub const fn key_algorithm(self) -> KeyAlgorithm {
        match self {
            Self::NoneWithDsa | Self::Sha1WithDsa => KeyAlgorithm::Dsa,
            Self::Md2WithRsa
            | Self::Md5WithRsa
            | Self::Sha1WithRsa
            | Self::Sha224WithRsa
            | Self::Sha256WithRsa
            | Self::Sha384WithRsa
            | Self::Sha512WithRsa => KeyAlgorithm::Rsa,
            Self::NoneWithEcdsa
            | Self::Sha1WithEcdsa
            | Self::Sha224WithEcdsa
            | Self::Sha256WithEcdsa
            | Self::Sha384WithEcdsa
            | Self::Sha512WithEcdsa => KeyAlgorithm::Ec,
        }
    }

    /// Message digest, `None` for the raw variants.
    pub const fn digest(self) -> Option<DigestAlgorithm> {
        match self {
            Self::NoneWithDsa | Self::NoneWithEcdsa => None,
            Self::Md2WithRsa => Some(DigestAlgorithm::Md2),
            Self::Md5WithRsa => Some(DigestAlgorithm::Md5),
            Self::Sha1WithDsa | Self::Sha1WithRsa | Self::Sha1WithEcdsa => {
                Some(DigestAlgorithm::Sha1)
            }
            Self::Sha224WithRsa | Self::Sha224WithEcdsa => Some(DigestAlgorithm::Sha224),
            Self::Sha256WithRsa | Self::Sha256WithEcdsa => Some(DigestAlgorithm::Sha256),
            Self::Sha384WithRsa | Self::Sha384WithEcdsa => Some(DigestAlgorithm::Sha384),
            Self::Sha512WithRsa | Self::Sha512WithEcdsa => Some(DigestAlgorithm::Sha512),
        }
    }

    /// Algorithm a digesting mechanism implements end to end, if any.
    fn for_streaming_mechanism(mechanism: Mechanism) -> Option<Self> {
        let algorithm = match mechanism {
            Mechanism::MD2_RSA_PKCS => Self::Md2WithRsa,
            Mechanism::MD5_RSA_PKCS => Self::Md5WithRsa,
            Mechanism::SHA1_RSA_PKCS => Self::Sha1WithRsa,
            Mechanism::SHA224_RSA_PKCS => Self::Sha224WithRsa,
            Mechanism::SHA256_RSA_PKCS => Self::Sha256WithRsa,
            Mechanism::SHA384_RSA_PKCS => Self::Sha384WithRsa,
            Mechanism::SHA512_RSA_PKCS => Self::Sha512WithRsa,
            Mechanism::DSA_SHA1 => Self::Sha1WithDsa,
            Mechanism::ECDSA_SHA1 => Self::Sha1WithEcdsa,
            _ => return None,
        };
        Some(algorithm)
    }
}

impl fmt::Display for SignatureAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SignatureAlgorithm {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let algorithm = match s {
            "NONEwithDSA" | "RawDSA" => Self::NoneWithDsa,
            "SHA1withDSA" | "DSA" => Self::Sha1WithDsa,
            "MD2withRSA" => Self::Md2WithRsa,
            "MD5withRSA" => Self::Md5WithRsa,
            "SHA1withRSA" => Self::Sha1WithRsa,
            "SHA224withRSA" => Self::Sha224WithRsa,
            "SHA256withRSA" => Self::Sha256WithRsa,
            "SHA384withRSA" => Self::Sha384WithRsa,
            "SHA512withRSA" => Self::Sha512WithRsa,
            "NONEwithECDSA" => Self::NoneWithEcdsa,
            "SHA1withECDSA" => Self::Sha1WithEcdsa,
            "SHA224withECDSA" => Self::Sha224WithEcdsa,
            "SHA256withECDSA" => Self::Sha256WithEcdsa,
            "SHA384withECDSA" => Self::Sha384WithEcdsa,
            "SHA512withECDSA" => Self::Sha512WithEcdsa,
            other => return Err(EngineError::UnsupportedAlgorithm(other.to_string())),
        };
        Ok(algorithm)
    }
}

/// Length contract for raw input.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RawInput {
    /// Input must be exactly this many bytes
    Exact(usize),
    /// Input may be up to this many bytes
    AtMost(usize),
}

impl RawInput {
    /// Buffer capacity needed to hold a valid input.
    pub fn capacity(&self) -> usize {
        match *self {
            RawInput::Exact(n) | RawInput::AtMost(n) => n,
        }
    }
}

/// How update data reaches the token.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcessingType {
    /// Hash locally, hand the token the digest at finish
    DigestLocal(DigestAlgorithm),
    /// Forward every update to the token's multi-part primitive
    StreamToBackend,
    /// Buffer a fixed-size block, hand it to the token at finish
    RawFixedBlock(RawInput),
}

/// Immutable description of what an engine instance computes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AlgorithmSpec {
    algorithm: SignatureAlgorithm,
    mechanism: Mechanism,
    processing: ProcessingType,
}

impl AlgorithmSpec {
    /// Resolve `algorithm` on `mechanism`.
    ///
    /// # Errors
    /// `UnsupportedAlgorithm` for an unknown name, an unknown mechanism, or a
    /// name the mechanism cannot implement.
    pub fn resolve(algorithm: &str, mechanism: Mechanism) -> Result<Self, EngineError> {
        let parsed: SignatureAlgorithm = algorithm.parse()?;
        let unsupported =
            || EngineError::UnsupportedAlgorithm(format!("{algorithm} with {mechanism}"));

        let processing = if let Some(streamed) = SignatureAlgorithm::for_streaming_mechanism(mechanism)
        {
            if streamed != parsed {
                return Err(unsupported());
            }
            ProcessingType::StreamToBackend
        } else {
            match (mechanism, parsed.key_algorithm(), parsed.digest()) {
                (Mechanism::DSA, KeyAlgorithm::Dsa, None) => {
                    ProcessingType::RawFixedBlock(RawInput::Exact(RAW_DSA_LEN))
                }
                (Mechanism::DSA, KeyAlgorithm::Dsa, Some(digest)) => {
                    ProcessingType::DigestLocal(digest)
                }
                (Mechanism::ECDSA, KeyAlgorithm::Ec, None) => {
                    ProcessingType::RawFixedBlock(RawInput::AtMost(RAW_ECDSA_MAX))
                }
                (Mechanism::ECDSA, KeyAlgorithm::Ec, Some(digest)) => {
                    ProcessingType::DigestLocal(digest)
                }
                (Mechanism::RSA_PKCS | Mechanism::RSA_X_509, KeyAlgorithm::Rsa, Some(digest)) => {
                    ProcessingType::DigestLocal(digest)
                }
                _ => return Err(unsupported()),
            }
        };

        Ok(Self {
            algorithm: parsed,
            mechanism,
            processing,
        })
    }

    /// The named algorithm.
    pub fn algorithm(&self) -> SignatureAlgorithm {
        self.algorithm
    }

    /// Token mechanism driven by the engine.
    pub fn mechanism(&self) -> Mechanism {
        self.mechanism
    }

    /// Key family.
    pub fn key_algorithm(&self) -> KeyAlgorithm {
        self.algorithm.key_algorithm()
    }

    /// Processing strategy.
    pub fn processing(&self) -> ProcessingType {
        self.processing
    }

    /// Digest named by the algorithm, wherever it is computed.
    pub fn digest_algorithm(&self) -> Option<DigestAlgorithm> {
        self.algorithm.digest()
    }

    /// Digest whose DigestInfo the engine must build itself (RSA on a
    /// mechanism without hashing).
    pub fn digest_info_algorithm(&self) -> Option<DigestAlgorithm> {
        match (self.key_algorithm(), self.processing) {
            (KeyAlgorithm::Rsa, ProcessingType::DigestLocal(digest)) => Some(digest),
            _ => None,
        }
    }

    /// OID of the digest the engine wraps in a DigestInfo.
    pub fn digest_oid(&self) -> Option<ObjectIdentifier> {
        self.digest_info_algorithm().map(DigestAlgorithm::oid)
    }

    /// True when the engine must apply PKCS#1 block-type-1 padding itself.
    pub fn pads_locally(&self) -> bool {
        self.mechanism == Mechanism::RSA_X_509
    }

    /// True when the token returns r || s that must be DER encoded.
    pub fn uses_der_signatures(&self) -> bool {
        self.key_algorithm() != KeyAlgorithm::Rsa
    }

    /// Output length hint for a streamed `C_SignFinal`.
    pub fn sign_final_len_hint(&self) -> usize {
        if self.key_algorithm() == KeyAlgorithm::Dsa {
            DSA_SIGNATURE_LEN
        } else {
            0
        }
    }
}

impl fmt::Display for AlgorithmSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} on {}", self.algorithm, self.mechanism)
    }
}
