use thiserror::Error;

/// Error taxonomy shared by every order-engine operation.
///
/// Business-rule violations keep their variant all the way to the caller.
/// Storage failures are logged at the site that saw them and collapsed
/// into `Internal`, so raw driver errors never leak out.
#[derive(Debug, Error)]
pub enum DomainError {
    /// Referenced order, line item, product or address does not exist
    /// (or is soft-deleted/inactive).
    #[error("not found: {0}")]
    NotFound(String),

    /// Caller's role or ownership does not permit the operation.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Structurally invalid input.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The requested write collides with existing state, e.g. adding a
    /// product that is already a line item of the order.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Mutation attempted against a terminal (delivered/cancelled) order.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Unexpected persistence failure, surfaced opaquely.
    #[error("internal error: {0}")]
    Internal(String),
}

impl DomainError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

pub type DomainResult<T> = Result<T, DomainError>;
