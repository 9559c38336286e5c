pub mod answer_matcher;
pub mod attempt_machine;
pub mod grading;
pub mod hooks;
pub mod scorer;

use thiserror::Error;

use crate::repositories::StoreError;

#[derive(Debug, Error)]
pub enum GradingError {
    #[error("activity not found: {0}")]
    ActivityNotFound(String),
    #[error("attempt not found: {0}")]
    AttemptNotFound(String),
    #[error("invalid submission: {0}")]
    InvalidRequest(String),
    /// Transient: a concurrent finalize won twice in a row. Safe to retry.
    #[error("persistence conflict: {0}")]
    Conflict(String),
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for GradingError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::AttemptNotFound(id) => Self::AttemptNotFound(id),
            StoreError::Conflict(message) => Self::Conflict(message),
            other => Self::Store(other),
        }
    }
}
