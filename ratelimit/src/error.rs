use thiserror::Error;
use trustgate_types::{ErrorKind, ParamError};

use crate::state::EntityKind;

#[derive(Debug, Error)]
pub enum RateLimitError {
    #[error("invalid rate-limit config: {0}")]
    InvalidConfig(#[from] ParamError),

    #[error("expected a {expected:?} state, got {actual:?}")]
    EntityMismatch {
        expected: EntityKind,
        actual: EntityKind,
    },
}

impl RateLimitError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::InvalidParameter
    }
}
