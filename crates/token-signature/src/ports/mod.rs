//! # Ports Layer
//!
//! Trait definitions for the hexagonal architecture.
//! - **Inbound (Driving)**: the signature operation callers drive
//! - **Outbound (Driven)**: the token primitives the engine needs

pub mod inbound;
pub mod outbound;
