//! # Signature Engine
//!
//! State machine driving one algorithm through init → update* → finish on a
//! pooled token session.
//!
//! ```text
//!   UNINITIALIZED ──init_sign/init_verify──► INITIALIZED ──update──┐
//!        ▲    ▲                                 │    ▲            │
//!        │    └──────── update (implicit init) ─┘    └────────────┘
//!        └──────────── sign / verify (always) ──────┘
//! ```
//!
//! ## Invariants
//!
//! - A finish always returns the engine to `UNINITIALIZED` and gives the
//!   session back, whatever the outcome. No session outlives a finish cycle.
//! - Rebinding a key first cancels the operation in flight.
//! - Verification reports malformed or non-matching signatures as `false`.

use crate::domain::accumulator::Accumulator;
use crate::domain::algorithm::{AlgorithmSpec, ProcessingType, DSA_SIGNATURE_LEN};
use crate::domain::codec;
use crate::domain::entities::{KeyAlgorithm, OperationMode, TokenKey};
use crate::domain::errors::{EngineError, TokenError};
use crate::domain::mechanism::Mechanism;
use crate::domain::validator;
use crate::ports::inbound::SignatureOperation;
use crate::ports::outbound::Token;
use crate::session::{SessionLease, SessionPool};
use shared_crypto::{encode_digest_info, Type1Padding};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace, warn};
use zeroize::Zeroizing;

/// Lifecycle state of an engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineState {
    /// No operation in progress
    Uninitialized,
    /// Key bound, session held, accepting updates
    Initialized,
}

/// Signature engine for one (algorithm, mechanism) binding.
///
/// Reusable across many messages. Not safe to share between threads
/// without external serialization; the session pool is.
pub struct SignatureEngine<T: Token> {
    pool: Arc<SessionPool<T>>,
    spec: AlgorithmSpec,
    key: Option<TokenKey>,
    mode: Option<OperationMode>,
    session: Option<SessionLease<T>>,
    accumulator: Accumulator,
    state: EngineState,
}

impl<T: Token> SignatureEngine<T> {
    /// Create an engine for `algorithm` on `mechanism`.
    ///
    /// # Errors
    /// `UnsupportedAlgorithm` if the pair does not resolve.
    pub fn new(
        pool: Arc<SessionPool<T>>,
        algorithm: &str,
        mechanism: Mechanism,
    ) -> Result<Self, EngineError> {
        let spec = AlgorithmSpec::resolve(algorithm, mechanism)?;
        debug!(
            algorithm = %spec.algorithm(),
            mechanism = %mechanism,
            processing = ?spec.processing(),
            "Created signature engine"
        );
        Ok(Self {
            pool,
            accumulator: Accumulator::new(spec.processing()),
            spec,
            key: None,
            mode: None,
            session: None,
            state: EngineState::Uninitialized,
        })
    }

    /// Resolved algorithm.
    pub fn spec(&self) -> &AlgorithmSpec {
        &self.spec
    }

    /// Current lifecycle state.
    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Mode of the last init, if any.
    pub fn mode(&self) -> Option<OperationMode> {
        self.mode
    }

    /// Currently bound key, if any.
    pub fn key(&self) -> Option<&TokenKey> {
        self.key.as_ref()
    }

    /// Session pool this engine draws from.
    pub fn pool(&self) -> &Arc<SessionPool<T>> {
        &self.pool
    }

    // =========================================================================
    // Init
    // =========================================================================

    fn bind(&mut self, key: &TokenKey, mode: OperationMode) -> Result<(), EngineError> {
        let rebinding = self.key.as_ref() != Some(key);
        let validation = validator::check_key(&self.spec, key, mode).and_then(|()| {
            if rebinding {
                self.check_key_size(key)
            } else {
                Ok(())
            }
        });

        self.cancel_in_flight();

        if let Err(err) = validation {
            debug!(mechanism = %self.spec.mechanism(), error = %err, "Key rejected");
            self.key = None;
            self.drop_session();
            return Err(err);
        }

        self.key = Some(key.clone());
        self.mode = Some(mode);
        self.initialize()
    }

    fn check_key_size(&self, key: &TokenKey) -> Result<(), EngineError> {
        let info = match self.pool.token().mechanism_info(self.spec.mechanism()) {
            Ok(info) => info,
            Err(err) => {
                warn!(
                    mechanism = %self.spec.mechanism(),
                    error = %err,
                    "Mechanism info unavailable, skipping key size bounds"
                );
                None
            }
        };
        validator::check_key_size(&self.spec, key, info)
    }

    /// Start an operation with the bound key and mode.
    fn initialize(&mut self) -> Result<(), EngineError> {
        let (handle, mode) = match (&self.key, self.mode) {
            (Some(key), Some(mode)) => (key.handle(), mode),
            _ => return Err(EngineError::InvalidState("no key bound")),
        };

        let mut lease = match self.session.take() {
            Some(lease) => lease,
            None => self.pool.acquire()?,
        };

        let mechanism = self.spec.mechanism();
        let (operation, result) = match mode {
            OperationMode::Sign => ("C_SignInit", lease.sign_init(mechanism, handle)),
            OperationMode::Verify => ("C_VerifyInit", lease.verify_init(mechanism, handle)),
        };
        if let Err(err) = result {
            lease.close();
            return Err(self.init_failure(operation, err));
        }

        trace!(mechanism = %mechanism, mode = %mode, session = ?lease.id(), "Operation initialized");
        self.accumulator.reset();
        self.session = Some(lease);
        self.state = EngineState::Initialized;
        Ok(())
    }

    fn init_failure(&mut self, operation: &'static str, err: TokenError) -> EngineError {
        if err.code.is_key_rejection() {
            self.key = None;
            EngineError::InvalidKey(format!("token rejected key: {err}"))
        } else {
            EngineError::provider(operation, err)
        }
    }

    fn ensure_initialized(&mut self) -> Result<(), EngineError> {
        match self.state {
            EngineState::Initialized => Ok(()),
            EngineState::Uninitialized => self.initialize(),
        }
    }

    fn require_mode(&self, expected: OperationMode) -> Result<(), EngineError> {
        match self.mode {
            Some(mode) if mode == expected => Ok(()),
            Some(OperationMode::Sign) => {
                Err(EngineError::InvalidState("engine initialized for signing"))
            }
            Some(OperationMode::Verify) => {
                Err(EngineError::InvalidState("engine initialized for verification"))
            }
            None => Err(EngineError::InvalidState("no key bound")),
        }
    }

    // =========================================================================
    // Cancellation
    // =========================================================================

    /// Abandon the operation in flight, if any, and give the session back.
    ///
    /// Best effort. When the token supports it the operation is finished
    /// with the input gathered so far and the result discarded, so the
    /// session returns to the pool idle. Otherwise, or if finishing fails,
    /// the session is closed.
    pub fn cancel_operation(&mut self) {
        self.cancel_in_flight();
        self.drop_session();
    }

    /// Cancel the operation in flight. A session that survives stays
    /// attached for the next `initialize`.
    fn cancel_in_flight(&mut self) {
        if self.state != EngineState::Initialized {
            return;
        }
        self.state = EngineState::Uninitialized;

        let Some(mut lease) = self.session.take() else {
            return;
        };
        if !lease.operation_active() {
            self.session = Some(lease);
            return;
        }
        if !self.pool.explicit_cancel() || !lease.has_objects() {
            debug!(session = ?lease.id(), "Cancelling by closing session");
            lease.kill();
            return;
        }

        match self.finish_for_cancel(&mut lease) {
            Ok(()) => {
                trace!(session = ?lease.id(), "Cancelled operation by finishing it");
                self.session = Some(lease);
            }
            Err(err) => {
                warn!(
                    mechanism = %self.spec.mechanism(),
                    session = ?lease.id(),
                    error = %err,
                    "Cancel failed, closing session"
                );
                lease.kill();
            }
        }
    }

    fn finish_for_cancel(&mut self, lease: &mut SessionLease<T>) -> Result<(), EngineError> {
        let mode = self
            .mode
            .ok_or(EngineError::InvalidState("no operation mode"))?;
        let streamed = self.spec.processing() == ProcessingType::StreamToBackend;

        let input = if streamed {
            None
        } else {
            let data = self
                .accumulator
                .cancel_input()
                .ok_or(EngineError::InvalidState("no input to finish the operation with"))?;
            Some(self.encode_for_token(data)?)
        };

        match mode {
            OperationMode::Sign => {
                let result = match &input {
                    None => lease.sign_final(self.spec.sign_final_len_hint()),
                    Some(data) => lease.sign(data),
                };
                result
                    .map(|_| ())
                    .map_err(|err| EngineError::provider("cancel", err))
            }
            OperationMode::Verify => {
                let dummy = vec![0u8; self.dummy_signature_len()];
                let result = match &input {
                    None => lease.verify_final(&dummy),
                    Some(data) => lease.verify(data, &dummy),
                };
                match result {
                    Err(err) if !err.code.is_signature_mismatch() => {
                        Err(EngineError::provider("cancel", err))
                    }
                    _ => Ok(()),
                }
            }
        }
    }

    fn dummy_signature_len(&self) -> usize {
        let key_bytes = self.key.as_ref().map_or(0, TokenKey::key_bytes);
        match self.spec.key_algorithm() {
            KeyAlgorithm::Dsa => DSA_SIGNATURE_LEN,
            // r || s at field width; the cancel result is discarded
            KeyAlgorithm::Ec => 2 * key_bytes,
            KeyAlgorithm::Rsa => key_bytes,
        }
    }

    /// Return the session to the pool and leave the engine idle.
    fn drop_session(&mut self) {
        self.state = EngineState::Uninitialized;
        if let Some(lease) = self.session.take() {
            lease.close();
        }
    }

    // =========================================================================
    // Finish
    // =========================================================================

    /// Input for a single-part `C_Sign` / `C_Verify`.
    fn prepare_input(&mut self) -> Result<Zeroizing<Vec<u8>>, EngineError> {
        let data = match self.spec.processing() {
            ProcessingType::DigestLocal(_) => self.accumulator.finish_digest()?,
            ProcessingType::RawFixedBlock(_) => {
                Zeroizing::new(self.accumulator.raw_input()?.to_vec())
            }
            ProcessingType::StreamToBackend => {
                return Err(EngineError::InvalidState("streamed operation has no local input"))
            }
        };
        self.encode_for_token(data)
    }

    /// Wrap a local digest in a DigestInfo and pad it when the mechanism
    /// does neither.
    fn encode_for_token(
        &self,
        data: Zeroizing<Vec<u8>>,
    ) -> Result<Zeroizing<Vec<u8>>, EngineError> {
        let Some(digest) = self.spec.digest_info_algorithm() else {
            return Ok(data);
        };
        let info = Zeroizing::new(encode_digest_info(digest, &data)?);
        if !self.spec.pads_locally() {
            return Ok(info);
        }
        let key_bits = self
            .key
            .as_ref()
            .map(TokenKey::key_bits)
            .ok_or(EngineError::InvalidState("no key bound"))?;
        let padding = Type1Padding::for_modulus_bits(key_bits)?;
        Ok(Zeroizing::new(padding.pad(&info)?))
    }

    fn finish_sign(&mut self, lease: &mut SessionLease<T>) -> Result<Vec<u8>, EngineError> {
        let signature = match self.spec.processing() {
            ProcessingType::StreamToBackend => lease
                .sign_final(self.spec.sign_final_len_hint())
                .map_err(|err| EngineError::provider("C_SignFinal", err))?,
            _ => {
                let input = self.prepare_input()?;
                lease
                    .sign(&input)
                    .map_err(|err| EngineError::provider("C_Sign", err))?
            }
        };
        if self.spec.uses_der_signatures() {
            codec::raw_to_der(&signature)
        } else {
            Ok(signature)
        }
    }

    fn finish_verify(
        &mut self,
        lease: &mut SessionLease<T>,
        signature: &[u8],
    ) -> Result<bool, EngineError> {
        let token_signature = if self.spec.uses_der_signatures() {
            let decoded = match self.spec.key_algorithm() {
                KeyAlgorithm::Dsa => codec::der_to_dsa(signature),
                _ => codec::der_to_ecdsa(signature),
            };
            match decoded {
                Ok(raw) => raw,
                Err(err) => {
                    debug!(error = %err, "Rejecting malformed signature encoding");
                    return Ok(false);
                }
            }
        } else {
            signature.to_vec()
        };

        let (operation, result) = match self.spec.processing() {
            ProcessingType::StreamToBackend => {
                ("C_VerifyFinal", lease.verify_final(&token_signature))
            }
            _ => {
                let input = self.prepare_input()?;
                ("C_Verify", lease.verify(&input, &token_signature))
            }
        };
        match result {
            Ok(()) => Ok(true),
            Err(err) if err.code.is_signature_mismatch() => {
                trace!(code = %err.code, "Signature did not verify");
                Ok(false)
            }
            Err(err) => Err(EngineError::provider(operation, err)),
        }
    }

    /// Detach the session for a finish. The engine is uninitialized from
    /// here on, whatever the finish returns.
    fn begin_finish(&mut self, mode: OperationMode) -> Result<SessionLease<T>, EngineError> {
        self.require_mode(mode)?;
        self.ensure_initialized()?;
        self.state = EngineState::Uninitialized;
        self.session
            .take()
            .ok_or(EngineError::InvalidState("no session held"))
    }
}

impl<T: Token> SignatureOperation for SignatureEngine<T> {
    fn init_sign(&mut self, key: &TokenKey) -> Result<(), EngineError> {
        self.bind(key, OperationMode::Sign)
    }

    fn init_verify(&mut self, key: &TokenKey) -> Result<(), EngineError> {
        self.bind(key, OperationMode::Verify)
    }

    fn update(&mut self, data: &[u8]) -> Result<(), EngineError> {
        self.ensure_initialized()?;
        if data.is_empty() {
            return Ok(());
        }

        if self.spec.processing() == ProcessingType::StreamToBackend {
            let mode = self
                .mode
                .ok_or(EngineError::InvalidState("no operation mode"))?;
            let lease = self
                .session
                .as_mut()
                .ok_or(EngineError::InvalidState("no session held"))?;
            let (operation, result) = match mode {
                OperationMode::Sign => ("C_SignUpdate", lease.sign_update(data)),
                OperationMode::Verify => ("C_VerifyUpdate", lease.verify_update(data)),
            };
            if let Err(err) = result {
                warn!(
                    mechanism = %self.spec.mechanism(),
                    error = %err,
                    "Streaming update failed, operation aborted"
                );
                self.drop_session();
                return Err(EngineError::provider(operation, err));
            }
        }

        self.accumulator.absorb(data);
        trace!(
            bytes = data.len(),
            total = self.accumulator.processed(),
            "Absorbed update"
        );
        Ok(())
    }

    fn sign(&mut self) -> Result<Vec<u8>, EngineError> {
        let mut lease = self.begin_finish(OperationMode::Sign)?;
        let result = self.finish_sign(&mut lease);
        lease.close();
        if let Err(err) = &result {
            debug!(mechanism = %self.spec.mechanism(), error = %err, "Sign failed");
        }
        result
    }

    fn verify(&mut self, signature: &[u8]) -> Result<bool, EngineError> {
        let mut lease = self.begin_finish(OperationMode::Verify)?;
        let result = self.finish_verify(&mut lease, signature);
        lease.close();
        result
    }
}

impl<T: Token> fmt::Debug for SignatureEngine<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignatureEngine")
            .field("spec", &self.spec)
            .field("mode", &self.mode)
            .field("state", &self.state)
            .field("session", &self.session)
            .finish()
    }
}
