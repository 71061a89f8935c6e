//! Local filesystem resource.

use crate::error::{ErrorKind, Result};
use crate::location::validate as validate_path;
use crate::{BoxReader, BoxWriter, Location, Resource};
use std::fs::{File, create_dir_all};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

/// A single file on the local filesystem.
///
/// # Examples
///
/// ```no_run
/// use tome_storage::LocalResource;
///
/// # fn example() -> tome_storage::error::Result<()> {
/// let resource = LocalResource::within("/var/backups", "2024/books.zip")?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct LocalResource {
    name: String,
    path: PathBuf,
    location: Location,
}

impl LocalResource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let name = path.file_name().map(|name| name.to_string_lossy().into_owned()).unwrap_or_default();
        Self { name, location: Location::Path(path.clone()), path }
    }

    /// A file relative to `root` that is not allowed to escape it.
    ///
    /// # Errors
    ///
    /// Returns an error if the root is not absolute or the relative path
    /// traverses above it.
    pub fn within(root: impl AsRef<Path>, relative: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        if !root.is_absolute() {
            exn::bail!(ErrorKind::InvalidLocation(root.display().to_string()));
        }
        Ok(Self::new(root.join(validate_path(relative)?)))
    }

    /// Change the display name used for format detection fallbacks.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl Resource for LocalResource {
    fn display_name(&self) -> &str {
        &self.name
    }

    fn location(&self) -> &Location {
        &self.location
    }

    fn reader(&self) -> Result<BoxReader> {
        let path = self.path.as_path();
        let file = File::open(path).map_err(|e| ErrorKind::from_io(e, path))?;
        tracing::trace!(path = %path.display(), "opened resource for reading");
        Ok(Box::new(BufReader::new(file)))
    }

    fn writer(&self) -> Result<BoxWriter> {
        let path = self.path.as_path();
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            create_dir_all(parent).map_err(|e| ErrorKind::from_io(e, parent))?;
        }
        let file = File::create(path).map_err(|e| ErrorKind::from_io(e, path))?;
        tracing::trace!(path = %path.display(), "opened resource for writing");
        Ok(Box::new(BufWriter::new(file)))
    }
}

impl From<PathBuf> for LocalResource {
    fn from(path: PathBuf) -> Self {
        Self::new(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};

    #[test]
    fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let resource = LocalResource::within(dir.path(), "nested/backup.zip").unwrap();
        assert_eq!(resource.display_name(), "backup.zip");

        let mut writer = resource.writer().unwrap();
        writer.write_all(b"PK\x03\x04").unwrap();
        writer.flush().unwrap();
        drop(writer);

        let mut data = Vec::new();
        resource.reader().unwrap().read_to_end(&mut data).unwrap();
        assert_eq!(data, b"PK\x03\x04");
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let resource = LocalResource::new(dir.path().join("missing.zip"));
        let err = resource.reader().err().unwrap();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_within_rejects_escape() {
        let dir = tempfile::tempdir().unwrap();
        assert!(LocalResource::within(dir.path(), "../outside.zip").is_err());
        assert!(LocalResource::within("relative/root", "inside.zip").is_err());
    }
}
