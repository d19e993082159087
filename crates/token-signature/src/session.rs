//! # Session Pool
//!
//! Bounded pool of token sessions shared by many engines.
//!
//! A session is reachable only through a [`SessionLease`]. The lease wraps
//! every token primitive for its session and tracks whether an operation is
//! still active, so that giving the session back can decide between reuse
//! and a forced close:
//!
//! ```text
//! acquire ──► lease ──► *_init ──► (active) ──► sign / *_final ──► (idle)
//!                                      │                              │
//!                            close/drop: kill               close/drop: release
//! ```

use crate::config::{ConfigError, SessionPoolConfig};
use crate::domain::entities::{ObjectHandle, SessionId};
use crate::domain::errors::{EngineError, ReturnCode, TokenError};
use crate::domain::mechanism::Mechanism;
use crate::ports::outbound::Token;
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, trace, warn};

/// Snapshot of pool occupancy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Sessions open on the token
    pub open: usize,
    /// Open sessions waiting for reuse
    pub idle: usize,
    /// Sessions currently leased
    pub in_use: usize,
}

#[derive(Default)]
struct PoolState {
    idle: Vec<SessionId>,
    open: usize,
}

/// Bounded, shared pool of sessions on one token.
pub struct SessionPool<T: Token> {
    token: T,
    config: SessionPoolConfig,
    state: Mutex<PoolState>,
    available: Condvar,
}

impl<T: Token> SessionPool<T> {
    /// Create a pool over `token`.
    pub fn new(token: T, config: SessionPoolConfig) -> Result<Arc<Self>, ConfigError> {
        config.validate()?;
        Ok(Self::build(token, config))
    }

    /// Create a pool with the default configuration.
    pub fn with_defaults(token: T) -> Arc<Self> {
        Self::build(token, SessionPoolConfig::default())
    }

    fn build(token: T, config: SessionPoolConfig) -> Arc<Self> {
        Arc::new(Self {
            token,
            config,
            state: Mutex::new(PoolState::default()),
            available: Condvar::new(),
        })
    }

    /// The underlying token.
    pub fn token(&self) -> &T {
        &self.token
    }

    /// Pool configuration.
    pub fn config(&self) -> &SessionPoolConfig {
        &self.config
    }

    /// Whether interrupted operations are finished on the token rather than
    /// dropped with their session.
    pub fn explicit_cancel(&self) -> bool {
        self.config.explicit_cancel
    }

    /// Current occupancy.
    pub fn stats(&self) -> PoolStats {
        let state = self.state.lock();
        PoolStats {
            open: state.open,
            idle: state.idle.len(),
            in_use: state.open - state.idle.len(),
        }
    }

    /// Lease a session, reusing an idle one or opening a new one.
    ///
    /// Blocks while the pool is at capacity, up to the configured timeout.
    ///
    /// # Errors
    /// * `ResourceExhausted` - timed out, or the token refused a new session
    /// * `ProviderFailure` - the token failed to open a session
    pub fn acquire(self: &Arc<Self>) -> Result<SessionLease<T>, EngineError> {
        let deadline = Instant::now() + self.config.acquire_timeout();
        let mut state = self.state.lock();
        loop {
            if let Some(id) = state.idle.pop() {
                trace!(session = %id, "Reusing idle session");
                return Ok(SessionLease::new(Arc::clone(self), id));
            }
            if state.open < self.config.max_sessions {
                state.open += 1;
                drop(state);
                return self.open_reserved();
            }
            let timed_out = self.available.wait_until(&mut state, deadline).timed_out();
            if timed_out && state.idle.is_empty() && state.open >= self.config.max_sessions {
                warn!(
                    max_sessions = self.config.max_sessions,
                    timeout_ms = self.config.acquire_timeout_ms,
                    "Timed out waiting for a token session"
                );
                return Err(EngineError::ResourceExhausted(format!(
                    "all {} sessions in use",
                    self.config.max_sessions
                )));
            }
        }
    }

    /// Open a session for a slot already counted in `open`.
    fn open_reserved(self: &Arc<Self>) -> Result<SessionLease<T>, EngineError> {
        match self.token.open_session() {
            Ok(id) => {
                debug!(session = %id, "Opened token session");
                Ok(SessionLease::new(Arc::clone(self), id))
            }
            Err(err) => {
                self.state.lock().open -= 1;
                self.available.notify_one();
                if err.code == ReturnCode::SessionCount {
                    Err(EngineError::ResourceExhausted(
                        "token refused to open a session".to_string(),
                    ))
                } else {
                    Err(EngineError::provider("C_OpenSession", err))
                }
            }
        }
    }

    fn release(&self, id: SessionId) {
        trace!(session = %id, "Returning session to pool");
        self.state.lock().idle.push(id);
        self.available.notify_one();
    }

    fn kill(&self, id: SessionId) {
        debug!(session = %id, "Closing token session");
        if let Err(err) = self.token.close_session(id) {
            warn!(session = %id, error = %err, "Failed to close token session");
        }
        self.state.lock().open -= 1;
        self.available.notify_one();
    }
}

impl<T: Token> fmt::Debug for SessionPool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionPool")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish()
    }
}

/// Exclusive use of one pooled session.
///
/// Dropping the lease is the same as [`SessionLease::close`].
pub struct SessionLease<T: Token> {
    pool: Arc<SessionPool<T>>,
    id: Option<SessionId>,
    operation_active: bool,
}

impl<T: Token> SessionLease<T> {
    fn new(pool: Arc<SessionPool<T>>, id: SessionId) -> Self {
        Self {
            pool,
            id: Some(id),
            operation_active: false,
        }
    }

    /// Session identifier, for diagnostics.
    pub fn id(&self) -> Option<SessionId> {
        self.id
    }

    /// True between a successful `*_init` and the call that ends the
    /// operation.
    pub fn operation_active(&self) -> bool {
        self.operation_active
    }

    /// True if the session owns token objects and must not be closed to
    /// abort an operation.
    pub fn has_objects(&self) -> bool {
        self.id
            .map(|id| self.pool.token.session_has_objects(id))
            .unwrap_or(false)
    }

    fn session(&self) -> Result<SessionId, TokenError> {
        self.id
            .ok_or_else(|| TokenError::new(ReturnCode::SessionHandleInvalid))
    }

    /// `C_SignInit`
    pub fn sign_init(&mut self, mechanism: Mechanism, key: ObjectHandle) -> Result<(), TokenError> {
        let id = self.session()?;
        self.pool.token.sign_init(id, mechanism, key)?;
        self.operation_active = true;
        Ok(())
    }

    /// `C_SignUpdate`; a failure ends the operation.
    pub fn sign_update(&mut self, data: &[u8]) -> Result<(), TokenError> {
        let id = self.session()?;
        let result = self.pool.token.sign_update(id, data);
        if result.is_err() {
            self.operation_active = false;
        }
        result
    }

    /// `C_SignFinal`
    pub fn sign_final(&mut self, expected_len: usize) -> Result<Vec<u8>, TokenError> {
        let id = self.session()?;
        self.operation_active = false;
        self.pool.token.sign_final(id, expected_len)
    }

    /// `C_Sign`
    pub fn sign(&mut self, data: &[u8]) -> Result<Vec<u8>, TokenError> {
        let id = self.session()?;
        self.operation_active = false;
        self.pool.token.sign(id, data)
    }

    /// `C_VerifyInit`
    pub fn verify_init(
        &mut self,
        mechanism: Mechanism,
        key: ObjectHandle,
    ) -> Result<(), TokenError> {
        let id = self.session()?;
        self.pool.token.verify_init(id, mechanism, key)?;
        self.operation_active = true;
        Ok(())
    }

    /// `C_VerifyUpdate`; a failure ends the operation.
    pub fn verify_update(&mut self, data: &[u8]) -> Result<(), TokenError> {
        let id = self.session()?;
        let result = self.pool.token.verify_update(id, data);
        if result.is_err() {
            self.operation_active = false;
        }
        result
    }

    /// `C_VerifyFinal`
    pub fn verify_final(&mut self, signature: &[u8]) -> Result<(), TokenError> {
        let id = self.session()?;
        self.operation_active = false;
        self.pool.token.verify_final(id, signature)
    }

    /// `C_Verify`
    pub fn verify(&mut self, data: &[u8], signature: &[u8]) -> Result<(), TokenError> {
        let id = self.session()?;
        self.operation_active = false;
        self.pool.token.verify(id, data, signature)
    }

    /// Give the session back: reused if idle, closed if an operation is
    /// still active on it.
    pub fn close(mut self) {
        self.finish();
    }

    /// Close the session on the token unconditionally.
    pub fn kill(mut self) {
        if let Some(id) = self.id.take() {
            self.pool.kill(id);
        }
    }

    fn finish(&mut self) {
        if let Some(id) = self.id.take() {
            if self.operation_active {
                debug!(session = %id, "Operation still active, dropping session");
                self.pool.kill(id);
            } else {
                self.pool.release(id);
            }
        }
    }
}

impl<T: Token> Drop for SessionLease<T> {
    fn drop(&mut self) {
        self.finish();
    }
}

impl<T: Token> fmt::Debug for SessionLease<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionLease")
            .field("id", &self.id)
            .field("operation_active", &self.operation_active)
            .finish()
    }
}
