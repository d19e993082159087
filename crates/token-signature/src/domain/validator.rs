//! # Key Validator
//!
//! Checks a key against the resolved algorithm before any session is used:
//! family and class, advertised mechanism bounds, and RSA padding headroom.

use super::algorithm::{AlgorithmSpec, SignatureAlgorithm};
use super::entities::{KeyAlgorithm, KeyClass, MechanismInfo, OperationMode, TokenKey};
use super::errors::EngineError;
use super::mechanism::Mechanism;
use shared_crypto::{digest_info_len, Type1Padding};

/// Largest DSA prime accepted for SHA1withDSA on `CKM_DSA`.
pub const DSA_SHA1_MAX_BITS: usize = 1024;

/// Check that `key` has the family the algorithm needs and the class the
/// operation needs.
pub fn check_key(
    spec: &AlgorithmSpec,
    key: &TokenKey,
    mode: OperationMode,
) -> Result<(), EngineError> {
    if key.algorithm() != spec.key_algorithm() {
        return Err(EngineError::InvalidKey(format!(
            "{} key cannot be used with {}",
            key.algorithm(),
            spec.algorithm()
        )));
    }
    let expected = match mode {
        OperationMode::Sign => KeyClass::Private,
        OperationMode::Verify => KeyClass::Public,
    };
    if key.class() != expected {
        return Err(EngineError::InvalidKey(format!(
            "{mode} requires a {} key",
            match expected {
                KeyClass::Private => "private",
                KeyClass::Public => "public",
            }
        )));
    }
    Ok(())
}

/// Check the key size against the token's bounds and, for RSA, the room
/// left for an encoded DigestInfo.
///
/// `info` of `None` means the token advertised nothing and disables the
/// bounds check. The RSA headroom check always runs.
pub fn check_key_size(
    spec: &AlgorithmSpec,
    key: &TokenKey,
    info: Option<MechanismInfo>,
) -> Result<(), EngineError> {
    let key_bits = key.key_bits();

    if let Some(info) = info {
        let mut max_bits = info.max_key_bits;
        // an unbounded token stays unbounded
        if spec.mechanism() == Mechanism::DSA
            && spec.algorithm() == SignatureAlgorithm::Sha1WithDsa
        {
            max_bits = max_bits.map(|max| max.min(DSA_SHA1_MAX_BITS));
        }
        if let Some(min) = info.min_key_bits {
            if key_bits < min {
                return Err(EngineError::InvalidKey(format!(
                    "{} key must be at least {min} bits",
                    key.algorithm()
                )));
            }
        }
        if let Some(max) = max_bits {
            if key_bits > max {
                return Err(EngineError::InvalidKey(format!(
                    "{} key must be at most {max} bits",
                    key.algorithm()
                )));
            }
        }
    }

    if key.algorithm() == KeyAlgorithm::Rsa {
        let padding = Type1Padding::for_modulus_bits(key_bits)
            .map_err(|e| EngineError::InvalidKey(e.to_string()))?;
        if let Some(digest) = spec.digest_algorithm() {
            if digest_info_len(digest)? > padding.max_data_size() {
                return Err(EngineError::InvalidKey(
                    "Key is too short for this signature algorithm".to_string(),
                ));
            }
        }
    }
    Ok(())
}
