//! Deterministic cryptographic helpers for the trustgate engine.
//!
//! - **Blake2b-256** for every digest (nonce hashes, entity hashes, identifiers)
//! - Identifier and nonce derivation from a caller-supplied [`BlockSeed`]:
//!   no random source is ever consulted, so replaying nodes agree byte for byte
//! - Entity hashing so phone numbers, emails and IPs are never stored in the clear
//!
//! [`BlockSeed`]: trustgate_types::BlockSeed

pub mod derive;
pub mod entity;
pub mod hash;

pub use derive::{derive_id, derive_nonce, hash_nonce, DerivationInput};
pub use entity::{hash_email, hash_entity, hash_ip, hash_phone};
pub use hash::{blake2b_256, blake2b_256_multi};
