//! Catalog Error Types

use derive_more::{Display, Error};

/// A catalog error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for catalog operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The entity was rejected by the catalog (missing identity, broken reference)
    #[display("invalid {entity}: {reason}")]
    Invalid {
        entity: &'static str,
        #[error(not(source))]
        reason: String,
    },
    /// The backing store could not be reached
    #[display("catalog unavailable: {_0}")]
    Unavailable(#[error(not(source))] String),
}

impl ErrorKind {
    pub fn invalid(entity: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid { entity, reason: reason.into() }
    }

    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}
