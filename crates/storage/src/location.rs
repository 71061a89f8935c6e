//! Resource locations and path validation.
//!
//! A [`Location`] is where an archive lives. Archives are only ever opened
//! from local files or opaque in-memory buffers; network locators parse
//! successfully (so callers can name them in errors) but can never be opened.

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::path::{Component, Path, PathBuf};

use crate::error::{ErrorKind, Result};

/// Schemes that identify a network locator.
const REMOTE_SCHEMES: [&str; 8] = ["http", "https", "ftp", "ftps", "sftp", "s3", "smb", "webdav"];

/// Where a resource lives.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Location {
    /// A file on the local filesystem.
    Path(PathBuf),
    /// A named in-memory buffer.
    Memory(String),
    /// A network locator. Parsed, never opened.
    Remote { scheme: String, uri: String },
}

impl Location {
    /// Parse a user-supplied locator.
    ///
    /// Strings without a `scheme://` prefix are treated as local paths.
    ///
    /// # Examples
    ///
    /// ```
    /// use tome_storage::Location;
    ///
    /// assert!(matches!(Location::parse("backup.zip").unwrap(), Location::Path(_)));
    /// assert!(matches!(Location::parse("file:///tmp/backup.zip").unwrap(), Location::Path(_)));
    /// assert!(Location::parse("https://example.com/backup.zip").unwrap().is_remote());
    /// assert!(Location::parse("gopher://example.com").is_err());
    /// ```
    pub fn parse(locator: &str) -> Result<Self> {
        let Some((scheme, rest)) = locator.split_once("://") else {
            if locator.is_empty() || locator.contains('\0') {
                exn::bail!(ErrorKind::InvalidLocation(locator.to_string()));
            }
            return Ok(Self::Path(PathBuf::from(locator)));
        };
        let scheme = scheme.to_ascii_lowercase();
        match scheme.as_str() {
            "file" if !rest.is_empty() => Ok(Self::Path(PathBuf::from(rest))),
            "memory" => Ok(Self::Memory(validate(rest)?.to_string_lossy().into_owned())),
            s if REMOTE_SCHEMES.contains(&s) => Ok(Self::Remote { scheme, uri: locator.to_string() }),
            _ => exn::bail!(ErrorKind::UnsupportedScheme(scheme)),
        }
    }

    /// Returns `true` for network locators.
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote { .. })
    }

    /// The final component of the location, used as a display name.
    pub fn file_name(&self) -> Option<&str> {
        match self {
            Self::Path(path) => path.file_name().and_then(|name| name.to_str()),
            Self::Memory(name) => name.rsplit('/').next().filter(|name| !name.is_empty()),
            Self::Remote { uri, .. } => uri.rsplit('/').next().filter(|name| !name.is_empty()),
        }
    }
}

impl Display for Location {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Path(path) => write!(f, "{}", path.display()),
            Self::Memory(name) => write!(f, "memory://{name}"),
            Self::Remote { uri, .. } => f.write_str(uri),
        }
    }
}

/// Validates a relative path, making sure it never escapes its root.
///
/// > **Note:** This does **not** normalize backslashes, non-UTF8 bytes, or
/// >           platform-specific weirdness. Null bytes are explicitly rejected.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use tome_storage::validate_path;
///
/// assert!(validate_path("backups/2024.zip").is_ok());
/// assert!(validate_path("../etc/passwd").is_err());
/// assert_eq!(validate_path("a/../b//./c.zip/").unwrap(), Path::new("b/c.zip"));
/// ```
pub fn validate(path: impl AsRef<Path>) -> Result<PathBuf> {
    let invalid = || ErrorKind::InvalidLocation(path.as_ref().display().to_string());
    let mut components = Vec::new();
    for component in path.as_ref().components() {
        match component {
            Component::Normal(s) => {
                // Null bytes pass through Path::components() on Unix but
                // truncate in C-based syscalls.
                if s.as_encoded_bytes().contains(&0) {
                    exn::bail!(invalid());
                }
                components.push(s)
            },
            Component::CurDir | Component::RootDir => {},
            Component::Prefix(_) => exn::bail!(invalid()),
            Component::ParentDir => {
                if components.pop().is_none() {
                    exn::bail!(invalid());
                }
            },
        }
    }
    match components.is_empty() {
        true => exn::bail!(invalid()),
        false => Ok(components.into_iter().collect()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("http://example.com/a.zip", "http")]
    #[case("HTTPS://example.com/a.zip", "https")]
    #[case("ftp://example.com/a.zip", "ftp")]
    #[case("s3://bucket/a.zip", "s3")]
    fn test_remote_locations(#[case] locator: &str, #[case] scheme: &str) {
        let location = Location::parse(locator).unwrap();
        assert!(location.is_remote());
        assert!(matches!(location, Location::Remote { scheme: s, .. } if s == scheme));
    }

    #[rstest]
    #[case("backup.zip", "backup.zip")]
    #[case("/var/tmp/backup (2).json", "backup (2).json")]
    #[case("file:///var/tmp/books.csv", "books.csv")]
    #[case("memory://scratch/export.zip", "export.zip")]
    fn test_file_name(#[case] locator: &str, #[case] expected: &str) {
        assert_eq!(Location::parse(locator).unwrap().file_name(), Some(expected));
    }

    #[test]
    fn test_rejected_locations() {
        assert!(Location::parse("").is_err());
        assert!(Location::parse("a\0b").is_err());
        assert!(Location::parse("gopher://hole").is_err());
        assert!(Location::parse("memory://../escape").is_err());
        assert!(Location::parse("file://").is_err());
    }

    #[test]
    fn test_path_normalization() {
        assert_eq!(validate(Path::new("a//b//c")).unwrap(), Path::new("a/b/c"));
        assert_eq!(validate(Path::new("a/./b/./c")).unwrap(), Path::new("a/b/c"));
        assert_eq!(validate(Path::new("a/b/..")).unwrap(), Path::new("a"));
        assert_eq!(validate(Path::new("a/b/c/")).unwrap(), Path::new("a/b/c"));
    }

    #[test]
    fn test_traversal_attempts() {
        assert!(validate(Path::new("../etc/passwd")).is_err());
        assert!(validate(Path::new("a/../../b")).is_err());
        assert!(validate(Path::new("..")).is_err());
    }

    #[test]
    fn test_empty_paths() {
        assert!(validate(Path::new("")).is_err());
        assert!(validate(Path::new(".")).is_err());
        assert!(validate(Path::new("//")).is_err());
    }
}
