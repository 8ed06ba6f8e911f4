//! Nullable infrastructure for deterministic testing.
//!
//! The engine takes time, block height and block entropy from its caller and
//! persists through a caller-supplied store. This crate provides test-friendly
//! stand-ins that:
//! - Return deterministic values
//! - Can be controlled programmatically
//! - Never touch the filesystem or network

pub mod clock;
pub mod store;

pub use clock::NullClock;
pub use store::NullKvStore;
