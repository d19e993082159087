//! Shared fixtures: a scripted token and key material.

#![allow(dead_code)]

use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use token_signature::{
    KeyClass, KeyPair, KeyParameters, Mechanism, MechanismInfo, ObjectHandle,
    ReturnCode, SessionId, SessionPool, SessionPoolConfig, Token, TokenError, TokenKey,
};
use tracing_subscriber::EnvFilter;

/// PKCS#1 RSA test key (1024-bit).
pub const RSA_1024_PEM: &str = include_str!("../data/rsa1024.pem");

/// Fixed secp256k1 secret scalar.
pub const EC_SECRET_HEX: &str = "c9afa9d845ba75166b5c215767b1d6934e50c3db36e89b127b8a622b120f6721";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Pool config with a short acquire timeout.
pub fn quick_config() -> SessionPoolConfig {
    SessionPoolConfig::default().with_acquire_timeout_ms(100)
}

pub fn mock_pool(token: MockToken) -> Arc<SessionPool<MockToken>> {
    SessionPool::new(token, quick_config()).unwrap()
}

// =============================================================================
// SCRIPTED TOKEN
// =============================================================================

struct MockKey {
    class: KeyClass,
    signature_len: usize,
}

struct MockOp {
    verify: bool,
    mechanism: Mechanism,
    key: ObjectHandle,
    streamed: Vec<u8>,
}

#[derive(Default)]
struct MockState {
    keys: HashMap<ObjectHandle, MockKey>,
    sessions: HashMap<SessionId, Option<MockOp>>,
    next_session: u64,
    next_pair: u64,
    session_limit: Option<usize>,
    session_objects: bool,
    mechanism_info: HashMap<Mechanism, MechanismInfo>,
    mechanism_info_error: Option<ReturnCode>,
    failures: HashMap<&'static str, ReturnCode>,
    next_signature: Option<Vec<u8>>,
    calls: Vec<String>,
    last_input: Vec<u8>,
}

/// Token double with deterministic fake signatures, a call log and
/// injectable failures.
///
/// Signatures are SHA-256 expansions of (key pair, input), sized like the
/// real thing: modulus length for RSA, 40 bytes for DSA, twice the field
/// size for EC. Private handles are even, their public halves odd.
#[derive(Default)]
pub struct MockToken {
    state: Mutex<MockState>,
}

impl MockToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session_limit(self, limit: usize) -> Self {
        self.state.lock().session_limit = Some(limit);
        self
    }

    pub fn with_session_objects(self, enabled: bool) -> Self {
        self.state.lock().session_objects = enabled;
        self
    }

    pub fn set_mechanism_info(&self, mechanism: Mechanism, info: MechanismInfo) {
        self.state.lock().mechanism_info.insert(mechanism, info);
    }

    pub fn fail_mechanism_info(&self, code: ReturnCode) {
        self.state.lock().mechanism_info_error = Some(code);
    }

    /// Make the next call of `operation` fail with `code`.
    pub fn fail_next(&self, operation: &'static str, code: ReturnCode) {
        self.state.lock().failures.insert(operation, code);
    }

    /// Replace the next produced signature.
    pub fn next_signature(&self, signature: Vec<u8>) {
        self.state.lock().next_signature = Some(signature);
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    pub fn count(&self, call: &str) -> usize {
        self.state.lock().calls.iter().filter(|c| *c == call).count()
    }

    /// Input of the last single-part `C_Sign` / `C_Verify`.
    pub fn last_input(&self) -> Vec<u8> {
        self.state.lock().last_input.clone()
    }

    pub fn open_sessions(&self) -> usize {
        self.state.lock().sessions.len()
    }

    pub fn add_rsa_key(&self, bits: usize) -> KeyPair {
        let mut modulus = vec![0xA5u8; bits / 8];
        modulus[0] = 0xC3;
        self.add_pair(KeyParameters::Rsa { modulus }, bits / 8)
    }

    pub fn add_dsa_key(&self, bits: usize) -> KeyPair {
        let mut prime_p = vec![0x5Au8; bits / 8];
        prime_p[0] = 0xF1;
        self.add_pair(KeyParameters::Dsa { prime_p }, 40)
    }

    pub fn add_ec_key(&self, field_bits: usize) -> KeyPair {
        self.add_pair(KeyParameters::Ec { field_bits }, 2 * ((field_bits + 7) / 8))
    }

    fn add_pair(&self, params: KeyParameters, signature_len: usize) -> KeyPair {
        let mut state = self.state.lock();
        state.next_pair += 1;
        let private = ObjectHandle(state.next_pair * 2);
        let public = ObjectHandle(state.next_pair * 2 + 1);
        state.keys.insert(
            private,
            MockKey {
                class: KeyClass::Private,
                signature_len,
            },
        );
        state.keys.insert(
            public,
            MockKey {
                class: KeyClass::Public,
                signature_len,
            },
        );
        KeyPair {
            private: TokenKey::new(private, KeyClass::Private, params.clone()),
            public: TokenKey::new(public, KeyClass::Public, params),
        }
    }

    fn enter(&self, state: &mut MockState, call: String, operation: &'static str) -> Result<(), TokenError> {
        state.calls.push(call);
        match state.failures.remove(operation) {
            Some(code) => Err(code.into()),
            None => Ok(()),
        }
    }

    fn init(
        &self,
        session: SessionId,
        mechanism: Mechanism,
        key: ObjectHandle,
        verify: bool,
    ) -> Result<(), TokenError> {
        let mut state = self.state.lock();
        let operation = if verify { "C_VerifyInit" } else { "C_SignInit" };
        self.enter(&mut state, operation.to_string(), operation)?;
        let expected = if verify {
            KeyClass::Public
        } else {
            KeyClass::Private
        };
        match state.keys.get(&key) {
            None => return Err(ReturnCode::KeyHandleInvalid.into()),
            Some(k) if k.class != expected => {
                return Err(ReturnCode::KeyFunctionNotPermitted.into())
            }
            Some(_) => {}
        }
        let slot = slot(&mut state, session)?;
        if slot.is_some() {
            return Err(ReturnCode::OperationActive.into());
        }
        *slot = Some(MockOp {
            verify,
            mechanism,
            key,
            streamed: Vec::new(),
        });
        Ok(())
    }

    fn update(&self, session: SessionId, data: &[u8], verify: bool) -> Result<(), TokenError> {
        let mut state = self.state.lock();
        let operation = if verify { "C_VerifyUpdate" } else { "C_SignUpdate" };
        if let Err(err) = self.enter(&mut state, operation.to_string(), operation) {
            *slot(&mut state, session)? = None;
            return Err(err);
        }
        match slot(&mut state, session)?.as_mut() {
            Some(op) if op.verify == verify => {
                op.streamed.extend_from_slice(data);
                Ok(())
            }
            _ => Err(ReturnCode::OperationNotInitialized.into()),
        }
    }

    /// End the operation and return the signature the key would produce.
    fn finish(
        &self,
        session: SessionId,
        data: Option<&[u8]>,
        verify: bool,
        call: String,
        operation: &'static str,
    ) -> Result<Vec<u8>, TokenError> {
        let mut state = self.state.lock();
        let entered = self.enter(&mut state, call, operation);
        let op = slot(&mut state, session)?.take();
        entered?;
        let op = match op {
            Some(op) if op.verify == verify => op,
            _ => return Err(ReturnCode::OperationNotInitialized.into()),
        };
        let mut input = op.streamed;
        if let Some(data) = data {
            if op.mechanism == Mechanism::DSA && data.len() != 20 {
                return Err(ReturnCode::DataLenRange.into());
            }
            input.extend_from_slice(data);
            state.last_input = input.clone();
        }
        let len = state
            .keys
            .get(&op.key)
            .map(|k| k.signature_len)
            .ok_or_else(|| TokenError::new(ReturnCode::KeyHandleInvalid))?;
        Ok(fake_signature(op.key.0 / 2, &input, len))
    }

    fn produced(&self, signature: Vec<u8>) -> Vec<u8> {
        self.state.lock().next_signature.take().unwrap_or(signature)
    }
}

fn slot(state: &mut MockState, session: SessionId) -> Result<&mut Option<MockOp>, TokenError> {
    state
        .sessions
        .get_mut(&session)
        .ok_or_else(|| TokenError::new(ReturnCode::SessionHandleInvalid))
}

fn check(expected: &[u8], signature: &[u8]) -> Result<(), TokenError> {
    if expected.len() != signature.len() {
        Err(ReturnCode::SignatureLenRange.into())
    } else if expected != signature {
        Err(ReturnCode::SignatureInvalid.into())
    } else {
        Ok(())
    }
}

/// Deterministic stand-in for a signature by key pair `pair` over `input`.
pub fn fake_signature(pair: u64, input: &[u8], len: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(len);
    let mut counter = 0u32;
    while out.len() < len {
        let block = Sha256::new()
            .chain_update(pair.to_be_bytes())
            .chain_update(counter.to_be_bytes())
            .chain_update(input)
            .finalize();
        out.extend_from_slice(&block);
        counter += 1;
    }
    out.truncate(len);
    out
}

impl Token for MockToken {
    fn open_session(&self) -> Result<SessionId, TokenError> {
        let mut state = self.state.lock();
        self.enter(&mut state, "C_OpenSession".to_string(), "C_OpenSession")?;
        if let Some(limit) = state.session_limit {
            if state.sessions.len() >= limit {
                return Err(ReturnCode::SessionCount.into());
            }
        }
        state.next_session += 1;
        let id = SessionId(state.next_session);
        state.sessions.insert(id, None);
        Ok(id)
    }

    fn close_session(&self, session: SessionId) -> Result<(), TokenError> {
        let mut state = self.state.lock();
        self.enter(&mut state, "C_CloseSession".to_string(), "C_CloseSession")?;
        state
            .sessions
            .remove(&session)
            .map(|_| ())
            .ok_or_else(|| TokenError::new(ReturnCode::SessionHandleInvalid))
    }

    fn session_has_objects(&self, _session: SessionId) -> bool {
        self.state.lock().session_objects
    }

    fn mechanism_info(&self, mechanism: Mechanism) -> Result<Option<MechanismInfo>, TokenError> {
        let state = self.state.lock();
        if let Some(code) = state.mechanism_info_error {
            return Err(code.into());
        }
        Ok(state.mechanism_info.get(&mechanism).copied())
    }

    fn sign_init(
        &self,
        session: SessionId,
        mechanism: Mechanism,
        key: ObjectHandle,
    ) -> Result<(), TokenError> {
        self.init(session, mechanism, key, false)
    }

    fn sign_update(&self, session: SessionId, data: &[u8]) -> Result<(), TokenError> {
        self.update(session, data, false)
    }

    fn sign_final(&self, session: SessionId, expected_len: usize) -> Result<Vec<u8>, TokenError> {
        let signature = self.finish(
            session,
            None,
            false,
            format!("C_SignFinal({expected_len})"),
            "C_SignFinal",
        )?;
        Ok(self.produced(signature))
    }

    fn sign(&self, session: SessionId, data: &[u8]) -> Result<Vec<u8>, TokenError> {
        let signature = self.finish(session, Some(data), false, "C_Sign".to_string(), "C_Sign")?;
        Ok(self.produced(signature))
    }

    fn verify_init(
        &self,
        session: SessionId,
        mechanism: Mechanism,
        key: ObjectHandle,
    ) -> Result<(), TokenError> {
        self.init(session, mechanism, key, true)
    }

    fn verify_update(&self, session: SessionId, data: &[u8]) -> Result<(), TokenError> {
        self.update(session, data, true)
    }

    fn verify_final(&self, session: SessionId, signature: &[u8]) -> Result<(), TokenError> {
        let expected = self.finish(
            session,
            None,
            true,
            "C_VerifyFinal".to_string(),
            "C_VerifyFinal",
        )?;
        check(&expected, signature)
    }

    fn verify(&self, session: SessionId, data: &[u8], signature: &[u8]) -> Result<(), TokenError> {
        let expected =
            self.finish(session, Some(data), true, "C_Verify".to_string(), "C_Verify")?;
        check(&expected, signature)
    }
}
