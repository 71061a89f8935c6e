use derive_more::{Display, Error};
use std::path::PathBuf;

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// A file, or the environment, could not be parsed into a configuration
    #[display("configuration could not be loaded")]
    Load,
    /// An explicitly requested configuration file does not exist
    #[display("configuration file not found: {}", _0.display())]
    Missing(#[error(not(source))] PathBuf),
    /// The configuration parsed but makes no sense
    #[display("invalid configuration: {_0}")]
    Invalid(#[error(not(source))] String),
}

impl ErrorKind {
    /// Configuration errors need the user to fix something first.
    pub fn is_retryable(&self) -> bool {
        false
    }
}
