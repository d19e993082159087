//! # Software Token
//!
//! In-memory [`Token`] for tests and embedding. RSA mechanisms run on the
//! `rsa` crate, ECDSA on secp256k1 via `k256`. DSA is not available.
//!
//! Sessions follow PKCS#11 rules: one active operation per session, the
//! final call ends it whether it succeeds or not, and a failed update
//! aborts it.

use crate::domain::entities::{
    KeyClass, KeyParameters, MechanismInfo, ObjectHandle, SessionId, TokenKey,
};
use crate::domain::errors::{ReturnCode, TokenError};
use crate::domain::mechanism::Mechanism;
use crate::ports::outbound::Token;
use k256::ecdsa::signature::hazmat::{PrehashSigner, PrehashVerifier};
use k256::ecdsa::{Signature, SigningKey, VerifyingKey};
use parking_lot::Mutex;
use rsa::traits::PublicKeyParts;
use rsa::{Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey};
use shared_crypto::{encode_digest_info, DigestAlgorithm, MessageDigest, Type1Padding};
use std::collections::HashMap;
use std::fmt;
use tracing::trace;

/// secp256k1 field size.
const SECP256K1_BITS: usize = 256;

/// Width of one secp256k1 scalar.
const SCALAR_LEN: usize = 32;

/// RSA modulus sizes the token accepts.
const RSA_MIN_BITS: usize = 512;
const RSA_MAX_BITS: usize = 4096;

/// Private and public halves of an imported key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyPair {
    /// Signing half
    pub private: TokenKey,
    /// Verification half
    pub public: TokenKey,
}

enum SoftKey {
    RsaPrivate(RsaPrivateKey),
    RsaPublic(RsaPublicKey),
    EcPrivate(SigningKey),
    EcPublic(VerifyingKey),
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Family {
    Rsa,
    Ec,
}

impl SoftKey {
    fn family(&self) -> Family {
        match self {
            SoftKey::RsaPrivate(_) | SoftKey::RsaPublic(_) => Family::Rsa,
            SoftKey::EcPrivate(_) | SoftKey::EcPublic(_) => Family::Ec,
        }
    }

    fn is_private(&self) -> bool {
        matches!(self, SoftKey::RsaPrivate(_) | SoftKey::EcPrivate(_))
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Purpose {
    Sign,
    Verify,
}

struct ActiveOperation {
    purpose: Purpose,
    mechanism: Mechanism,
    key: ObjectHandle,
    digest: Option<MessageDigest>,
}

#[derive(Default)]
struct TokenState {
    keys: HashMap<ObjectHandle, SoftKey>,
    sessions: HashMap<SessionId, Option<ActiveOperation>>,
    next_handle: u64,
    next_session: u64,
}

impl TokenState {
    fn store(&mut self, key: SoftKey) -> ObjectHandle {
        self.next_handle += 1;
        let handle = ObjectHandle(self.next_handle);
        self.keys.insert(handle, key);
        handle
    }

    fn slot(&mut self, session: SessionId) -> Result<&mut Option<ActiveOperation>, TokenError> {
        self.sessions
            .get_mut(&session)
            .ok_or_else(|| TokenError::new(ReturnCode::SessionHandleInvalid))
    }

    fn key(&self, handle: ObjectHandle) -> Result<&SoftKey, TokenError> {
        self.keys
            .get(&handle)
            .ok_or_else(|| TokenError::new(ReturnCode::KeyHandleInvalid))
    }
}

/// Software implementation of the token port.
pub struct SoftToken {
    state: Mutex<TokenState>,
    max_sessions: Option<usize>,
    session_objects: bool,
}

impl Default for SoftToken {
    fn default() -> Self {
        Self::new()
    }
}

impl SoftToken {
    /// Empty token with no session limit.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(TokenState::default()),
            max_sessions: None,
            session_objects: false,
        }
    }

    /// Refuse to open more than `max` sessions at once.
    pub fn with_session_limit(mut self, max: usize) -> Self {
        self.max_sessions = Some(max);
        self
    }

    /// Report every session as owning objects, so operations are cancelled
    /// by finishing them instead of closing the session.
    pub fn with_session_objects(mut self, enabled: bool) -> Self {
        self.session_objects = enabled;
        self
    }

    /// Sessions currently open.
    pub fn open_sessions(&self) -> usize {
        self.state.lock().sessions.len()
    }

    /// Store an RSA key pair.
    pub fn import_rsa_key(&self, key: RsaPrivateKey) -> KeyPair {
        let modulus = key.n().to_bytes_be();
        let public = key.to_public_key();
        let mut state = self.state.lock();
        let private_handle = state.store(SoftKey::RsaPrivate(key));
        let public_handle = state.store(SoftKey::RsaPublic(public));
        KeyPair {
            private: TokenKey::new(
                private_handle,
                KeyClass::Private,
                KeyParameters::Rsa {
                    modulus: modulus.clone(),
                },
            ),
            public: TokenKey::new(public_handle, KeyClass::Public, KeyParameters::Rsa { modulus }),
        }
    }

    /// Store a secp256k1 key pair.
    pub fn import_ec_key(&self, key: SigningKey) -> KeyPair {
        let verifying = *key.verifying_key();
        let mut state = self.state.lock();
        let private_handle = state.store(SoftKey::EcPrivate(key));
        let public_handle = state.store(SoftKey::EcPublic(verifying));
        let params = KeyParameters::Ec {
            field_bits: SECP256K1_BITS,
        };
        KeyPair {
            private: TokenKey::new(private_handle, KeyClass::Private, params.clone()),
            public: TokenKey::new(public_handle, KeyClass::Public, params),
        }
    }

    fn init(
        &self,
        session: SessionId,
        mechanism: Mechanism,
        handle: ObjectHandle,
        purpose: Purpose,
    ) -> Result<(), TokenError> {
        let family = mechanism_family(mechanism)?;
        let mut state = self.state.lock();
        if state.slot(session)?.is_some() {
            return Err(ReturnCode::OperationActive.into());
        }
        let key = state.key(handle)?;
        if key.family() != family {
            return Err(ReturnCode::KeyTypeInconsistent.into());
        }
        if key.is_private() != (purpose == Purpose::Sign) {
            return Err(ReturnCode::KeyFunctionNotPermitted.into());
        }
        *state.slot(session)? = Some(ActiveOperation {
            purpose,
            mechanism,
            key: handle,
            digest: hashing_digest(mechanism).map(MessageDigest::new),
        });
        trace!(session = %session, mechanism = %mechanism, "Soft token operation started");
        Ok(())
    }

    fn update(&self, session: SessionId, purpose: Purpose, data: &[u8]) -> Result<(), TokenError> {
        let mut state = self.state.lock();
        let slot = state.slot(session)?;
        let result: Result<(), TokenError> = match slot.as_mut() {
            Some(op) if op.purpose == purpose => match op.digest.as_mut() {
                Some(md) => {
                    md.update(data);
                    return Ok(());
                }
                None => Err(ReturnCode::FunctionFailed.into()),
            },
            _ => Err(ReturnCode::OperationNotInitialized.into()),
        };
        *slot = None;
        result
    }

    /// End the session's operation and return it with the input the key
    /// operation needs: the token-computed digest for hashing mechanisms,
    /// `data` otherwise.
    fn finish(
        &self,
        state: &mut TokenState,
        session: SessionId,
        purpose: Purpose,
        data: Option<&[u8]>,
    ) -> Result<(ActiveOperation, Vec<u8>), TokenError> {
        let mut op = match state.slot(session)?.take() {
            Some(op) if op.purpose == purpose => op,
            _ => return Err(ReturnCode::OperationNotInitialized.into()),
        };
        let input = match (op.digest.as_mut(), data) {
            (Some(md), Some(data)) => md.update(data).finalize_reset().to_vec(),
            (Some(md), None) => md.finalize_reset().to_vec(),
            (None, Some(data)) => data.to_vec(),
            (None, None) => return Err(ReturnCode::FunctionFailed.into()),
        };
        Ok((op, input))
    }

    fn compute(
        &self,
        session: SessionId,
        data: Option<&[u8]>,
    ) -> Result<Vec<u8>, TokenError> {
        let mut state = self.state.lock();
        let (op, input) = self.finish(&mut state, session, Purpose::Sign, data)?;
        match state.key(op.key)? {
            SoftKey::RsaPrivate(key) => {
                let payload = rsa_payload(op.mechanism, key.size(), &input)?;
                key.sign(Pkcs1v15Sign::new_unprefixed(), &payload)
                    .map_err(|_| TokenError::new(ReturnCode::FunctionFailed))
            }
            SoftKey::EcPrivate(key) => {
                let signature: Signature = key
                    .sign_prehash(&input)
                    .map_err(|_| TokenError::new(ReturnCode::DataLenRange))?;
                Ok(signature.to_bytes().to_vec())
            }
            _ => Err(ReturnCode::KeyFunctionNotPermitted.into()),
        }
    }

    fn check(
        &self,
        session: SessionId,
        data: Option<&[u8]>,
        signature: &[u8],
    ) -> Result<(), TokenError> {
        let mut state = self.state.lock();
        let (op, input) = self.finish(&mut state, session, Purpose::Verify, data)?;
        match state.key(op.key)? {
            SoftKey::RsaPublic(key) => {
                if signature.len() != key.size() {
                    return Err(ReturnCode::SignatureLenRange.into());
                }
                let payload = rsa_payload(op.mechanism, key.size(), &input)?;
                key.verify(Pkcs1v15Sign::new_unprefixed(), &payload, signature)
                    .map_err(|_| TokenError::new(ReturnCode::SignatureInvalid))
            }
            SoftKey::EcPublic(key) => {
                let signature = ec_signature(signature)?;
                key.verify_prehash(&input, &signature)
                    .map_err(|_| TokenError::new(ReturnCode::SignatureInvalid))
            }
            _ => Err(ReturnCode::KeyFunctionNotPermitted.into()),
        }
    }
}

impl Token for SoftToken {
    fn open_session(&self) -> Result<SessionId, TokenError> {
        let mut state = self.state.lock();
        if let Some(max) = self.max_sessions {
            if state.sessions.len() >= max {
                return Err(ReturnCode::SessionCount.into());
            }
        }
        state.next_session += 1;
        let id = SessionId(state.next_session);
        state.sessions.insert(id, None);
        Ok(id)
    }

    fn close_session(&self, session: SessionId) -> Result<(), TokenError> {
        self.state
            .lock()
            .sessions
            .remove(&session)
            .map(|_| ())
            .ok_or_else(|| TokenError::new(ReturnCode::SessionHandleInvalid))
    }

    fn session_has_objects(&self, _session: SessionId) -> bool {
        self.session_objects
    }

    fn mechanism_info(&self, mechanism: Mechanism) -> Result<Option<MechanismInfo>, TokenError> {
        Ok(Some(match mechanism_family(mechanism)? {
            Family::Rsa => MechanismInfo::bounded(RSA_MIN_BITS, RSA_MAX_BITS),
            Family::Ec => MechanismInfo::bounded(SECP256K1_BITS, SECP256K1_BITS),
        }))
    }

    fn sign_init(
        &self,
        session: SessionId,
        mechanism: Mechanism,
        key: ObjectHandle,
    ) -> Result<(), TokenError> {
        self.init(session, mechanism, key, Purpose::Sign)
    }

    fn sign_update(&self, session: SessionId, data: &[u8]) -> Result<(), TokenError> {
        self.update(session, Purpose::Sign, data)
    }

    fn sign_final(&self, session: SessionId, _expected_len: usize) -> Result<Vec<u8>, TokenError> {
        self.compute(session, None)
    }

    fn sign(&self, session: SessionId, data: &[u8]) -> Result<Vec<u8>, TokenError> {
        self.compute(session, Some(data))
    }

    fn verify_init(
        &self,
        session: SessionId,
        mechanism: Mechanism,
        key: ObjectHandle,
    ) -> Result<(), TokenError> {
        self.init(session, mechanism, key, Purpose::Verify)
    }

    fn verify_update(&self, session: SessionId, data: &[u8]) -> Result<(), TokenError> {
        self.update(session, Purpose::Verify, data)
    }

    fn verify_final(&self, session: SessionId, signature: &[u8]) -> Result<(), TokenError> {
        self.check(session, None, signature)
    }

    fn verify(&self, session: SessionId, data: &[u8], signature: &[u8]) -> Result<(), TokenError> {
        self.check(session, Some(data), signature)
    }
}

impl fmt::Debug for SoftToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("SoftToken")
            .field("keys", &state.keys.len())
            .field("sessions", &state.sessions.len())
            .field("max_sessions", &self.max_sessions)
            .finish()
    }
}

fn mechanism_family(mechanism: Mechanism) -> Result<Family, TokenError> {
    match mechanism {
        Mechanism::RSA_PKCS
        | Mechanism::RSA_X_509
        | Mechanism::MD2_RSA_PKCS
        | Mechanism::MD5_RSA_PKCS
        | Mechanism::SHA1_RSA_PKCS
        | Mechanism::SHA224_RSA_PKCS
        | Mechanism::SHA256_RSA_PKCS
        | Mechanism::SHA384_RSA_PKCS
        | Mechanism::SHA512_RSA_PKCS => Ok(Family::Rsa),
        Mechanism::ECDSA | Mechanism::ECDSA_SHA1 => Ok(Family::Ec),
        _ => Err(ReturnCode::MechanismInvalid.into()),
    }
}

/// Digest a mechanism computes on the token, if it hashes at all.
fn hashing_digest(mechanism: Mechanism) -> Option<DigestAlgorithm> {
    match mechanism {
        Mechanism::MD2_RSA_PKCS => Some(DigestAlgorithm::Md2),
        Mechanism::MD5_RSA_PKCS => Some(DigestAlgorithm::Md5),
        Mechanism::SHA1_RSA_PKCS | Mechanism::ECDSA_SHA1 => Some(DigestAlgorithm::Sha1),
        Mechanism::SHA224_RSA_PKCS => Some(DigestAlgorithm::Sha224),
        Mechanism::SHA256_RSA_PKCS => Some(DigestAlgorithm::Sha256),
        Mechanism::SHA384_RSA_PKCS => Some(DigestAlgorithm::Sha384),
        Mechanism::SHA512_RSA_PKCS => Some(DigestAlgorithm::Sha512),
        _ => None,
    }
}

/// The PKCS#1 payload (DigestInfo) an RSA mechanism signs for `input`.
fn rsa_payload(
    mechanism: Mechanism,
    modulus_len: usize,
    input: &[u8],
) -> Result<Vec<u8>, TokenError> {
    let padding =
        Type1Padding::new(modulus_len).map_err(|_| TokenError::new(ReturnCode::KeySizeRange))?;
    let payload = match (mechanism, hashing_digest(mechanism)) {
        (_, Some(digest)) => encode_digest_info(digest, input)
            .map_err(|_| TokenError::new(ReturnCode::DataLenRange))?,
        (Mechanism::RSA_X_509, None) => padding
            .unpad(input)
            .map_err(|_| TokenError::new(ReturnCode::DataLenRange))?
            .to_vec(),
        _ => input.to_vec(),
    };
    if payload.len() > padding.max_data_size() {
        return Err(ReturnCode::DataLenRange.into());
    }
    Ok(payload)
}

/// Parse an r || s block of any even width up to the scalar size.
fn ec_signature(block: &[u8]) -> Result<Signature, TokenError> {
    if block.is_empty() || block.len() % 2 != 0 || block.len() > 2 * SCALAR_LEN {
        return Err(ReturnCode::SignatureLenRange.into());
    }
    let (r, s) = block.split_at(block.len() / 2);
    let mut fixed = [0u8; 2 * SCALAR_LEN];
    fixed[SCALAR_LEN - r.len()..SCALAR_LEN].copy_from_slice(r);
    fixed[2 * SCALAR_LEN - s.len()..].copy_from_slice(s);
    Signature::from_slice(&fixed).map_err(|_| TokenError::new(ReturnCode::SignatureInvalid))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ec_pair(token: &SoftToken) -> KeyPair {
        let key = SigningKey::from_slice(&[0x42u8; 32]).unwrap();
        token.import_ec_key(key)
    }

    #[test]
    fn test_session_limit() {
        let token = SoftToken::new().with_session_limit(1);
        let first = token.open_session().unwrap();
        assert_eq!(
            token.open_session().unwrap_err().code,
            ReturnCode::SessionCount
        );
        token.close_session(first).unwrap();
        assert!(token.open_session().is_ok());
        assert_eq!(
            token.close_session(SessionId(99)).unwrap_err().code,
            ReturnCode::SessionHandleInvalid
        );
    }

    #[test]
    fn test_one_operation_per_session() {
        let token = SoftToken::new();
        let pair = ec_pair(&token);
        let session = token.open_session().unwrap();
        token
            .sign_init(session, Mechanism::ECDSA, pair.private.handle())
            .unwrap();
        assert_eq!(
            token
                .sign_init(session, Mechanism::ECDSA, pair.private.handle())
                .unwrap_err()
                .code,
            ReturnCode::OperationActive
        );
        token.sign(session, &[7u8; 32]).unwrap();
        assert_eq!(
            token.sign(session, &[7u8; 32]).unwrap_err().code,
            ReturnCode::OperationNotInitialized
        );
    }

    #[test]
    fn test_key_misuse_codes() {
        let token = SoftToken::new();
        let pair = ec_pair(&token);
        let session = token.open_session().unwrap();
        assert_eq!(
            token
                .sign_init(session, Mechanism::ECDSA, pair.public.handle())
                .unwrap_err()
                .code,
            ReturnCode::KeyFunctionNotPermitted
        );
        assert_eq!(
            token
                .sign_init(session, Mechanism::SHA256_RSA_PKCS, pair.private.handle())
                .unwrap_err()
                .code,
            ReturnCode::KeyTypeInconsistent
        );
        assert_eq!(
            token
                .sign_init(session, Mechanism::DSA, pair.private.handle())
                .unwrap_err()
                .code,
            ReturnCode::MechanismInvalid
        );
        assert_eq!(
            token.mechanism_info(Mechanism::DSA_SHA1).unwrap_err().code,
            ReturnCode::MechanismInvalid
        );
    }

    #[test]
    fn test_update_on_single_part_mechanism_aborts() {
        let token = SoftToken::new();
        let pair = ec_pair(&token);
        let session = token.open_session().unwrap();
        token
            .sign_init(session, Mechanism::ECDSA, pair.private.handle())
            .unwrap();
        assert!(token.sign_update(session, b"data").is_err());
        // the failed update ended the operation
        assert!(token
            .sign_init(session, Mechanism::ECDSA, pair.private.handle())
            .is_ok());
    }

    #[test]
    fn test_ec_streaming_sign_verify() {
        let token = SoftToken::new();
        let pair = ec_pair(&token);
        let session = token.open_session().unwrap();

        token
            .sign_init(session, Mechanism::ECDSA_SHA1, pair.private.handle())
            .unwrap();
        token.sign_update(session, b"hello ").unwrap();
        token.sign_update(session, b"token").unwrap();
        let signature = token.sign_final(session, 0).unwrap();
        assert_eq!(signature.len(), 64);

        token
            .verify_init(session, Mechanism::ECDSA_SHA1, pair.public.handle())
            .unwrap();
        token.verify(session, b"hello token", &signature).unwrap();

        token
            .verify_init(session, Mechanism::ECDSA_SHA1, pair.public.handle())
            .unwrap();
        assert_eq!(
            token
                .verify(session, b"hello tokem", &signature)
                .unwrap_err()
                .code,
            ReturnCode::SignatureInvalid
        );
    }

    #[test]
    fn test_ec_signature_widths() {
        assert!(ec_signature(&[]).is_err());
        assert!(ec_signature(&[1u8; 65]).is_err());
        assert_eq!(
            ec_signature(&[1u8; 66]).unwrap_err().code,
            ReturnCode::SignatureLenRange
        );
        assert!(ec_signature(&[1u8; 62]).is_ok());
    }
}
