//! Unified error types for the epx workspace.
//!
//! Library crates surface their failures through [`EpxError`]; domain-specific
//! errors convert into it at API boundaries so callers can handle everything
//! uniformly.

use thiserror::Error;

/// Unified error type for all epx operations.
#[derive(Error, Debug)]
pub enum EpxError {
    /// Inconsistent matrix sizes at construction or while splicing dummies.
    #[error("invalid shape: {0}")]
    InvalidShape(String),

    /// An operation was called before the object was in the required state.
    #[error("unprepared: {0}")]
    Unprepared(String),

    /// A parameter vector of the wrong length was supplied.
    #[error("wrong arity: expected {expected}, found {found}")]
    WrongArity { expected: usize, found: usize },

    /// Instance or model data failed validation.
    #[error("validation error: {0}")]
    Validation(String),

    /// A solve succeeded but the result is numerically unusable.
    #[error("numerical issue: {0}")]
    Numerical(String),

    /// The wall-clock budget expired.
    #[error("time limit reached")]
    TimeLimit,

    /// The backend solver returned an unexpected status or failed outright.
    #[error("solver error: {0}")]
    Solver(String),

    /// I/O errors (file access etc.)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Parsing errors while loading persisted state or instances.
    #[error("parse error: {0}")]
    Parse(String),
}

/// Convenience alias for results using [`EpxError`].
pub type EpxResult<T> = Result<T, EpxError>;

impl From<String> for EpxError {
    fn from(s: String) -> Self {
        EpxError::Validation(s)
    }
}

impl From<&str> for EpxError {
    fn from(s: &str) -> Self {
        EpxError::Validation(s.to_string())
    }
}
