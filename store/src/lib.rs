//! Storage for verification state.
//!
//! The engine never performs I/O. Callers supply an ordered key-value store
//! implementing [`KvStore`]; [`VerificationRepository`] lays every record and
//! secondary index out over it using the configured [`KeyPrefixes`].
//!
//! [`KeyPrefixes`]: trustgate_verification::KeyPrefixes

pub mod error;
pub mod keys;
pub mod kv;
pub mod repository;

pub use error::StoreError;
pub use keys::KeySpace;
pub use kv::{prefix_upper_bound, KvPair, KvStore};
pub use repository::VerificationRepository;
