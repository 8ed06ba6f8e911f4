//! Fundamental types for the trustgate verification engine.
//!
//! This crate defines the types shared across every other crate in the workspace:
//! account addresses, scope identifiers, hashes, timestamps and block heights,
//! verification statuses, factor kinds, the error taxonomy, and the policy
//! parameter structs that callers source from governance.

pub mod address;
pub mod block;
pub mod error;
pub mod factor;
pub mod hash;
pub mod params;
pub mod state;
pub mod time;

pub use address::{AccountAddress, ScopeId};
pub use block::{BlockHeight, BlockSeed};
pub use error::{ErrorKind, ParamError};
pub use factor::FactorKind;
pub use hash::Hash256;
pub use params::{
    BorderlineParams, ChallengeParams, ChannelRateLimitConfig, GlobalRateLimitConfig, QueueParams,
    MAX_SCORE,
};
pub use state::VerificationStatus;
pub use time::Timestamp;
