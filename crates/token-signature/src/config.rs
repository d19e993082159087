//! Session pool configuration and validation

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Largest pool the engine will manage.
pub const MAX_SESSIONS_LIMIT: usize = 4096;

/// Invalid configuration value.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// `max_sessions` outside 1..=MAX_SESSIONS_LIMIT
    #[error("max_sessions must be between 1 and {max}, got {value}")]
    InvalidMaxSessions {
        /// Configured value
        value: usize,
        /// Upper limit
        max: usize,
    },

    /// Zero acquire timeout
    #[error("acquire_timeout_ms cannot be 0")]
    ZeroAcquireTimeout,
}

/// Session pool configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionPoolConfig {
    /// Upper bound on sessions open at once
    pub max_sessions: usize,
    /// How long `acquire` waits for a free session
    pub acquire_timeout_ms: u64,
    /// Abort operations by finishing them on the token. When false an
    /// interrupted operation's session is closed instead.
    pub explicit_cancel: bool,
}

impl Default for SessionPoolConfig {
    fn default() -> Self {
        Self {
            max_sessions: 32,
            acquire_timeout_ms: 5_000,
            explicit_cancel: true,
        }
    }
}

impl SessionPoolConfig {
    /// Check every field is within range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_sessions == 0 || self.max_sessions > MAX_SESSIONS_LIMIT {
            return Err(ConfigError::InvalidMaxSessions {
                value: self.max_sessions,
                max: MAX_SESSIONS_LIMIT,
            });
        }
        if self.acquire_timeout_ms == 0 {
            return Err(ConfigError::ZeroAcquireTimeout);
        }
        Ok(())
    }

    /// Acquire timeout as a `Duration`.
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    /// Builder-style method to set the session bound
    pub fn with_max_sessions(mut self, max: usize) -> Self {
        self.max_sessions = max;
        self
    }

    /// Builder-style method to set the acquire timeout
    pub fn with_acquire_timeout_ms(mut self, ms: u64) -> Self {
        self.acquire_timeout_ms = ms;
        self
    }

    /// Builder-style method to toggle explicit cancellation
    pub fn with_explicit_cancel(mut self, enabled: bool) -> Self {
        self.explicit_cancel = enabled;
        self
    }
}
