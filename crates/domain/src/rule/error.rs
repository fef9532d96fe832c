use thiserror::Error;

/// Errors surfaced by the rule and group stores.
///
/// The stores are free of business rules: a violated uniqueness constraint
/// is a `Conflict`, a failed lookup is `NotFound`, and anything the storage
/// engine reports is wrapped in `Storage`.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("storage failure: {0}")]
    Storage(String),
}
