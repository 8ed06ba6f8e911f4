use thiserror::Error;
use trustgate_ratelimit::{LimitType, RateLimitCheck, RateLimitError};
use trustgate_types::{ErrorKind, ParamError, Timestamp, VerificationStatus};

use crate::queue::RequestStatus;

#[derive(Debug, Error)]
pub enum VerificationError {
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("invalid status transition {from} -> {to}")]
    InvalidTransition {
        from: VerificationStatus,
        to: VerificationStatus,
    },

    #[error("request {request_id} cannot move {from:?} -> {to:?}")]
    InvalidRequestTransition {
        request_id: String,
        from: RequestStatus,
        to: RequestStatus,
    },

    #[error("{0} not found")]
    NotFound(String),

    #[error("{id} expired at {expired_at}")]
    Expired { id: String, expired_at: Timestamp },

    #[error("nonce for challenge {0} has already been used")]
    NonceReplay(String),

    #[error("nonce does not match challenge {0}")]
    NonceMismatch(String),

    #[error("rate limited ({limit_type:?}): retry after {retry_after_secs}s")]
    RateLimited {
        limit_type: Option<LimitType>,
        retry_after_secs: u64,
        remaining_hourly: Option<u32>,
        remaining_daily: Option<u32>,
        reason: String,
    },

    #[error("scope {scope_id} is held by request {owner} ({status})")]
    ScopeBusy {
        scope_id: String,
        owner: String,
        status: VerificationStatus,
    },

    #[error("request {request_id} exhausted its {max_retries} retries")]
    RetriesExhausted { request_id: String, max_retries: u32 },

    #[error("{id} is already terminal ({status})")]
    AlreadyTerminal { id: String, status: String },

    #[error("store error: {0}")]
    Store(String),
}

impl VerificationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidParameter(_) => ErrorKind::InvalidParameter,
            Self::InvalidTransition { .. }
            | Self::InvalidRequestTransition { .. }
            | Self::ScopeBusy { .. } => ErrorKind::InvalidTransition,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Expired { .. } => ErrorKind::Expired,
            Self::NonceReplay(_) => ErrorKind::NonceReplay,
            Self::NonceMismatch(_) => ErrorKind::NonceMismatch,
            Self::RateLimited { .. } => ErrorKind::RateLimited,
            Self::RetriesExhausted { .. } => ErrorKind::RetriesExhausted,
            Self::AlreadyTerminal { .. } => ErrorKind::AlreadyTerminal,
            Self::Store(_) => ErrorKind::Storage,
        }
    }

    pub(crate) fn already_terminal(id: &str, status: impl std::fmt::Debug) -> Self {
        Self::AlreadyTerminal {
            id: id.to_string(),
            status: format!("{status:?}"),
        }
    }
}

impl From<ParamError> for VerificationError {
    fn from(e: ParamError) -> Self {
        Self::InvalidParameter(e.to_string())
    }
}

impl From<RateLimitError> for VerificationError {
    fn from(e: RateLimitError) -> Self {
        Self::InvalidParameter(e.to_string())
    }
}

impl From<RateLimitCheck> for VerificationError {
    fn from(check: RateLimitCheck) -> Self {
        Self::RateLimited {
            limit_type: check.limit_type,
            retry_after_secs: check.retry_after_secs,
            remaining_hourly: check.remaining_hourly,
            remaining_daily: check.remaining_daily,
            reason: check.reason,
        }
    }
}
