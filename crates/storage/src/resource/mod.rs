//! Resource handles.
//!
//! A [`Resource`] is an opaque, seekable byte source and sink. Consumers never
//! see a filesystem path, only the capability to open a reader or a writer.

mod local;
#[cfg(any(test, feature = "mock"))]
mod memory;

pub use self::local::LocalResource;
#[cfg(any(test, feature = "mock"))]
pub use self::memory::MemoryResource;
use crate::Location;
use crate::error::{ErrorKind, Result};
use std::io::{Read, Seek, Write};
use std::sync::Arc;

/// A readable, seekable stream that can cross threads.
pub trait ReadSeek: Read + Seek + Send {}
impl<T: Read + Seek + Send> ReadSeek for T {}

/// A writable, seekable stream that can cross threads.
pub trait WriteSeek: Write + Seek + Send {}
impl<T: Write + Seek + Send> WriteSeek for T {}

pub type BoxReader = Box<dyn ReadSeek>;
pub type BoxWriter = Box<dyn WriteSeek>;

/// Open/read/write capability over a single archive.
///
/// Every call to [`reader`](Resource::reader) or [`writer`](Resource::writer)
/// returns a fresh, independent stream positioned at the start. Dropping the
/// stream releases it. Opening a writer truncates whatever was there before.
///
/// # Examples
///
/// ```no_run
/// use std::io::Read;
/// use tome_storage::{Resource, LocalResource};
///
/// # fn example() -> tome_storage::error::Result<()> {
/// let resource = LocalResource::new("/var/backups/books.zip");
/// let mut head = Vec::new();
/// resource.reader()?.take(4).read_to_end(&mut head).map_err(tome_storage::error::ErrorKind::Io)?;
/// # Ok(())
/// # }
/// ```
pub trait Resource: Send + Sync {
    /// Human readable name, usually the file name. Used as a fallback when
    /// sniffing content is inconclusive.
    fn display_name(&self) -> &str;

    fn location(&self) -> &Location;

    fn reader(&self) -> Result<BoxReader>;

    fn writer(&self) -> Result<BoxWriter>;
}

pub type ResourceHandle = Arc<dyn Resource>;

/// Open a resource handle for a parsed location.
///
/// In-memory locations only exist inside the process that created them, so
/// they cannot be opened from a locator string.
pub fn open(location: &Location) -> Result<ResourceHandle> {
    match location {
        Location::Path(path) => Ok(Arc::new(LocalResource::new(path))),
        Location::Memory(name) => exn::bail!(ErrorKind::InvalidLocation(format!("memory://{name}"))),
        Location::Remote { scheme, .. } => exn::bail!(ErrorKind::UnsupportedScheme(scheme.clone())),
    }
}
