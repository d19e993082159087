//! # Token Signature Engine
//!
//! Signs and verifies with RSA, DSA and ECDSA keys held on a session-oriented
//! cryptographic token (PKCS#11 style).
//!
//! ## Architecture
//!
//! This crate follows hexagonal architecture:
//! - **Domain Layer** (`domain/`): algorithm resolution, key validation,
//!   input accumulation, r || s / DER codec. No token I/O.
//! - **Ports Layer** (`ports/`): `SignatureOperation` (driving) and `Token`
//!   (driven)
//! - **Session Layer** (`session.rs`): bounded pool of token sessions
//! - **Engine** (`engine.rs`): the init → update* → finish state machine
//! - **Adapters** (`adapters/`): in-memory software token
//!
//! ## Processing Modes
//!
//! | Mode               | Update                     | Finish                      |
//! |--------------------|----------------------------|-----------------------------|
//! | Digest locally     | hash in process            | `C_Sign(digest)`            |
//! | Stream to token    | `C_SignUpdate(bytes)`      | `C_SignFinal`               |
//! | Raw fixed block    | buffer (sticky overflow)   | `C_Sign(block)`             |
//!
//! ## Example
//!
//! ```ignore
//! let pool = SessionPool::new(SoftToken::new(), SessionPoolConfig::default())?;
//! let mut engine = SignatureEngine::new(pool, "SHA256withRSA", Mechanism::SHA256_RSA_PKCS)?;
//! engine.init_sign(&keys.private)?;
//! engine.update(b"message")?;
//! let signature = engine.sign()?;
//! ```

#![warn(missing_docs)]

pub mod adapters;
pub mod config;
pub mod domain;
pub mod engine;
pub mod ports;
pub mod session;

// Re-export public API
pub use adapters::{KeyPair, SoftToken};
pub use config::{ConfigError, SessionPoolConfig};
pub use domain::algorithm::{AlgorithmSpec, ProcessingType, RawInput, SignatureAlgorithm};
pub use domain::entities::{
    KeyAlgorithm, KeyClass, KeyParameters, MechanismInfo, ObjectHandle, OperationMode, SessionId,
    TokenKey,
};
pub use domain::errors::{EngineError, ReturnCode, SignatureFormatError, TokenError};
pub use domain::mechanism::Mechanism;
pub use engine::{EngineState, SignatureEngine};
pub use ports::inbound::SignatureOperation;
pub use ports::outbound::Token;
pub use session::{PoolStats, SessionLease, SessionPool};
