//! Errors raised while opening a resource.

use derive_more::{Display, Error};
use std::io::Error as IoError;
use std::path::{Path, PathBuf};

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

/// What went wrong with a resource, classified so the archive layer can map
/// it onto its own categories.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Resource does not exist
    #[display("resource not found: {}", _0.display())]
    NotFound(#[error(not(source))] PathBuf),
    /// The process may not read or write the resource
    #[display("permission denied: {}", _0.display())]
    PermissionDenied(#[error(not(source))] PathBuf),
    /// No space left on the device
    #[display("storage full: {}", _0.display())]
    StorageFull(#[error(not(source))] PathBuf),
    /// Underlying I/O error
    #[display("I/O error: {_0}")]
    Io(IoError),
    /// Location is malformed or escapes its root
    #[display("invalid location: {_0}")]
    InvalidLocation(#[error(not(source))] String),
    /// Location names a scheme this crate will not open (network locators)
    #[display("unsupported scheme: {_0}")]
    UnsupportedScheme(#[error(not(source))] String),
}
impl From<IoError> for ErrorKind {
    fn from(err: IoError) -> Self {
        Self::Io(err)
    }
}

impl ErrorKind {
    /// Classify an I/O error that happened while accessing `path`.
    pub fn from_io(err: IoError, path: &Path) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(path.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
            std::io::ErrorKind::StorageFull => Self::StorageFull(path.to_path_buf()),
            _ => Self::Io(err),
        }
    }

    /// Only unclassified I/O failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}
