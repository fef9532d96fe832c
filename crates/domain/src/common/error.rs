use thiserror::Error;

use crate::rule::error::StoreError;

/// Cross-cutting error taxonomy shared by the services and adapters.
///
/// `Transient` marks failures the caller may retry at its own discretion;
/// everything else is final for the operation that produced it.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("storage failure: {0}")]
    Storage(String),

    #[error("transient failure: {0}")]
    Transient(String),
}

impl From<StoreError> for DomainError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => Self::NotFound(what),
            StoreError::Conflict(what) => Self::Conflict(what),
            StoreError::Storage(msg) => Self::Storage(msg),
        }
    }
}
