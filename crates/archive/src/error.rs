//! Archive Error Types
//!
//! Every failure is classified by what the caller has to do about it. The
//! lower-level error (storage, catalog, parser) is kept as a child in the
//! `exn` error tree, so the richer detail is never lost.
//!
//! Cancellation is deliberately absent: a cancelled session is a successful
//! [`Outcome::Cancelled`](crate::Outcome), never an `Err`.

use derive_more::{Display, Error};
use tome_catalog::error::Error as CatalogError;
use tome_storage::error::{Error as StorageError, ErrorKind as StorageErrorKind};

/// An archive error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for archive operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Container or record is structurally invalid or unrecognised. Retrying
    /// will not help.
    #[display("{}", _0.as_deref().unwrap_or("file not recognized"))]
    Format(#[error(not(source))] Option<String>),
    /// Authentication or authorisation failed. Surface immediately.
    #[display("access to the archive was denied")]
    Credentials,
    /// Local storage is exhausted or unavailable. The user has to act.
    #[display("storage is full or unavailable")]
    Storage,
    /// Transient or unclassified I/O failure. The caller may retry the whole
    /// operation.
    #[display("I/O error")]
    Io,
    /// A programming contract was broken by the caller.
    #[display("contract violation: {_0}")]
    Contract(#[error(not(source))] &'static str),
}

impl ErrorKind {
    /// A format error with a message richer than "file not recognized".
    pub fn format(message: impl Into<String>) -> Self {
        Self::Format(Some(message.into()))
    }

    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io)
    }

    /// Classify a raw I/O error.
    pub fn from_io(err: &std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::StorageFull => Self::Storage,
            std::io::ErrorKind::PermissionDenied => Self::Credentials,
            std::io::ErrorKind::InvalidData | std::io::ErrorKind::UnexpectedEof => Self::Format(None),
            _ => Self::Io,
        }
    }

    /// Wrap a raw I/O error, preserving it as the child frame.
    #[track_caller]
    pub fn io(err: std::io::Error) -> Error {
        let kind = Self::from_io(&err);
        exn::Exn::from(err).raise(kind)
    }

    /// Convert a storage error into an archive error, preserving the storage
    /// crate's `Exn` frame as a child.
    #[track_caller]
    pub fn storage(err: StorageError) -> Error {
        let kind = match &*err {
            StorageErrorKind::PermissionDenied(_) => Self::Credentials,
            StorageErrorKind::StorageFull(_) => Self::Storage,
            StorageErrorKind::InvalidLocation(_) | StorageErrorKind::UnsupportedScheme(_) => {
                Self::format((*err).to_string())
            },
            StorageErrorKind::NotFound(_) | StorageErrorKind::Io(_) => Self::Io,
        };
        err.raise(kind)
    }

    /// Container-level catalog failures (an export query failing) leave the
    /// archive unusable.
    #[track_caller]
    pub fn catalog(err: CatalogError) -> Error {
        err.raise(Self::Storage)
    }

    #[track_caller]
    pub fn json(err: serde_json::Error) -> Error {
        let kind = match err.classify() {
            serde_json::error::Category::Io => Self::Io,
            _ => Self::format(format!("malformed JSON: {err}")),
        };
        exn::Exn::from(err).raise(kind)
    }

    #[track_caller]
    pub fn csv(err: csv::Error) -> Error {
        let kind = match err.kind() {
            csv::ErrorKind::Io(io) => Self::from_io(io),
            _ => Self::format(format!("malformed CSV: {err}")),
        };
        exn::Exn::from(err).raise(kind)
    }

    #[track_caller]
    pub fn xml(err: quick_xml::Error) -> Error {
        let kind = match &err {
            quick_xml::Error::Io(io) => Self::from_io(io),
            _ => Self::format(format!("malformed XML: {err}")),
        };
        exn::Exn::from(err).raise(kind)
    }

    #[track_caller]
    pub fn zip(err: zip::result::ZipError) -> Error {
        let kind = match &err {
            zip::result::ZipError::Io(io) => Self::from_io(io),
            _ => Self::format(format!("malformed zip archive: {err}")),
        };
        exn::Exn::from(err).raise(kind)
    }
}
