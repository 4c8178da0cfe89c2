//! Error taxonomy shared by the engine and storage backends.
//!
//! Backends wrap their native errors with [`Error::storage`]; the engine
//! never inspects the wrapped source, only the variant. Facade methods fail
//! with [`Error::Precondition`] or [`Error::InvalidInput`] before performing
//! any I/O.

use thiserror::Error;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// A record with the given id does not exist.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// The caller supplied an unusable argument (empty query text, empty
    /// required filter, mismatched embedding dimension, malformed path).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A required collaborator is missing or unconfigured.
    #[error("precondition failed: {0}")]
    Precondition(String),

    /// The cancellation token was triggered.
    #[error("operation cancelled")]
    Cancelled,

    /// Transient storage or I/O failure from a backend.
    #[error("storage error: {0}")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// A collaborator violated its contract (e.g. an embedder returned a
    /// vector of the wrong length).
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Wrap a backend error as a transient storage failure.
    pub fn storage(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Error::Storage(err.into())
    }

    /// Shorthand for a missing record of the given kind.
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        Error::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// True if this error identifies a missing record.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }
}
