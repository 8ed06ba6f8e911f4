//! Error taxonomy shared across crates.

use thiserror::Error;

/// The kind of a failure, independent of which crate produced it.
///
/// Every crate error exposes `kind()` so callers can drive a client's next
/// action without matching concrete variants.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed or contradictory config or record.
    InvalidParameter,
    /// Status change not in the transition table.
    InvalidTransition,
    /// Referenced request, record, or challenge is absent.
    NotFound,
    /// Time-bound entity accessed past its deadline.
    Expired,
    /// A consumed nonce was presented again.
    NonceReplay,
    /// The presented nonce does not match the challenge.
    NonceMismatch,
    /// Quota or cooldown violation.
    RateLimited,
    /// The retry budget of a request is spent.
    RetriesExhausted,
    /// Mutation attempted on a terminal record.
    AlreadyTerminal,
    /// The caller's store failed.
    Storage,
}

/// A policy parameter failed validation.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("invalid parameter `{field}`: {reason}")]
pub struct ParamError {
    pub field: &'static str,
    pub reason: String,
}

impl ParamError {
    pub fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        ErrorKind::InvalidParameter
    }
}
