//! Trust verification orchestration.
//!
//! Four deterministic components, each a policy object over caller-owned state:
//!
//! - [`StatusMachine`]: the only way a scope's [`VerificationStatus`] changes,
//!   emitting one [`VerificationEvent`] per accepted transition.
//! - [`BorderlineEngine`]: classifies confidence scores and drives the
//!   multi-factor fallback opened for in-band scores.
//! - [`ChallengeRegistry`]: channel-agnostic challenges with single-use nonces.
//! - [`RequestQueue`]: verification requests with bounded retries.
//!
//! [`VerificationEngine`] wires them together for one request at a time.
//! Nothing here reads a clock or a random source: `now`, the block height and
//! the block seed are always supplied by the caller.
//!
//! [`VerificationStatus`]: trustgate_types::VerificationStatus

pub mod borderline;
pub mod challenge;
pub mod config;
pub mod engine;
pub mod error;
pub mod queue;
pub mod status;

pub use borderline::{
    classify, BorderlineEngine, Decision, FallbackOutcome, FallbackRecord, FallbackStatus,
};
pub use challenge::{Challenge, ChallengeRegistry, ChallengeStatus, NonceSet};
pub use config::{ChannelRateLimits, ConfigError, EngineConfig, KeyPrefixes, LoggingConfig};
pub use engine::{BlockContext, ChannelLimiters, VerificationCase, VerificationEngine};
pub use error::VerificationError;
pub use queue::{RequestQueue, RequestStatus, VerificationRequest};
pub use status::{
    allowed_targets, can_transition, EventContext, ScopeState, StatusMachine, VerificationEvent,
};
