//! # Adapters Layer
//!
//! Implementations of the outbound ports.

pub mod soft_token;

pub use soft_token::{KeyPair, SoftToken};
