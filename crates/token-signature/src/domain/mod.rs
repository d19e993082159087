//! # Domain Layer
//!
//! Pure signature logic with no token I/O: algorithm resolution, key
//! validation, input accumulation and the r || s / DER codec.
//! This is the inner layer of the hexagonal architecture.

pub mod accumulator;
pub mod algorithm;
pub mod codec;
pub mod entities;
pub mod errors;
pub mod mechanism;
pub mod validator;
