use thiserror::Error;
use trustgate_types::{ErrorKind, VerificationStatus};
use trustgate_verification::VerificationError;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("key not found: {0}")]
    NotFound(String),

    #[error("duplicate key: {0}")]
    Duplicate(String),

    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("database is corrupted: {0}")]
    Corruption(String),

    #[error("scope {scope_id} is held by request {owner} ({status})")]
    ScopeOwned {
        scope_id: String,
        owner: String,
        status: VerificationStatus,
    },
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::ScopeOwned { .. } => ErrorKind::InvalidTransition,
            _ => ErrorKind::Storage,
        }
    }
}

impl From<bincode::Error> for StoreError {
    fn from(e: bincode::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<StoreError> for VerificationError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(what) => VerificationError::NotFound(what),
            StoreError::ScopeOwned {
                scope_id,
                owner,
                status,
            } => VerificationError::ScopeBusy {
                scope_id,
                owner,
                status,
            },
            other => VerificationError::Store(other.to_string()),
        }
    }
}
