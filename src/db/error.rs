//! Error taxonomy for the data-access layer

use thiserror::Error;

/// Errors surfaced by repositories and the validation services.
///
/// The first three variants are caller-correctable and carry the offending
/// id in their message. `Store` wraps the underlying sqlx failure and is
/// propagated unmodified; this layer never retries it.
#[derive(Debug, Error)]
pub enum RepoError {
    /// Malformed input: bad identifier format, a required reference that
    /// does not resolve, or out-of-range paging values.
    #[error("{0}")]
    Invalid(String),

    /// The operation targets a row that does not exist.
    #[error("{0}")]
    NotFound(String),

    /// A uniqueness rule was violated; the message names the existing row.
    #[error("{0}")]
    Conflict(String),

    /// The underlying store failed.
    #[error("database error: {0}")]
    Store(#[from] sqlx::Error),
}

impl RepoError {
    pub fn invalid(detail: impl Into<String>) -> Self {
        Self::Invalid(detail.into())
    }

    pub fn not_found(detail: impl Into<String>) -> Self {
        Self::NotFound(detail.into())
    }

    pub fn conflict(detail: impl Into<String>) -> Self {
        Self::Conflict(detail.into())
    }
}
