//! In-memory resource for testing.

use crate::error::Result;
use crate::location::validate as validate_path;
use crate::{BoxReader, BoxWriter, Location, Resource};
use std::io::{Cursor, Read, Result as IoResult, Seek, SeekFrom, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

#[derive(Debug, Default)]
struct Handles {
    opened: AtomicUsize,
    closed: AtomicUsize,
}

/// Counts a stream as open for as long as it lives.
#[derive(Debug)]
struct HandleGuard(Arc<Handles>);

impl HandleGuard {
    fn new(handles: &Arc<Handles>) -> Self {
        handles.opened.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(handles))
    }
}

impl Drop for HandleGuard {
    fn drop(&mut self) {
        self.0.closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// In-memory resource for testing.
///
/// Clones share the same buffer, so a test can hand one clone to the code
/// under test and inspect the bytes (and how many streams were opened and
/// released) through another.
///
/// # Examples
///
/// ```
/// use std::io::Write;
/// use tome_storage::{MemoryResource, Resource};
///
/// let resource = MemoryResource::new("export.zip");
/// resource.writer().unwrap().write_all(b"hello").unwrap();
/// assert_eq!(resource.bytes(), b"hello");
/// assert_eq!(resource.open_handles(), 0);
/// ```
#[derive(Debug, Clone)]
pub struct MemoryResource {
    name: String,
    location: Location,
    data: Arc<RwLock<Vec<u8>>>,
    handles: Arc<Handles>,
}

impl MemoryResource {
    /// Create an empty in-memory resource.
    ///
    /// Panics if the name fails validation. If test setup is wrong, then the
    /// test should not pass.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_bytes(name, Vec::new())
    }

    /// Create an in-memory resource holding `bytes`.
    pub fn with_bytes(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        let name = name.into();
        let Ok(validated) = validate_path(&name) else {
            panic!("MemoryResource::with_bytes: invalid name {name}");
        };
        let location = Location::Memory(validated.to_string_lossy().into_owned());
        let name = location.file_name().unwrap_or_default().to_string();
        Self {
            name,
            location,
            data: Arc::new(RwLock::new(bytes.into())),
            handles: Arc::default(),
        }
    }

    /// Snapshot of the committed contents.
    pub fn bytes(&self) -> Vec<u8> {
        self.data.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Number of streams ever opened on this resource.
    pub fn opened(&self) -> usize {
        self.handles.opened.load(Ordering::SeqCst)
    }

    /// Number of streams released.
    pub fn closed(&self) -> usize {
        self.handles.closed.load(Ordering::SeqCst)
    }

    /// Streams currently open.
    pub fn open_handles(&self) -> usize {
        self.opened() - self.closed()
    }
}

impl Resource for MemoryResource {
    fn display_name(&self) -> &str {
        &self.name
    }

    fn location(&self) -> &Location {
        &self.location
    }

    fn reader(&self) -> Result<BoxReader> {
        let snapshot = self.bytes();
        Ok(Box::new(MemoryReader {
            cursor: Cursor::new(snapshot),
            _guard: HandleGuard::new(&self.handles),
        }))
    }

    fn writer(&self) -> Result<BoxWriter> {
        self.data.write().unwrap_or_else(PoisonError::into_inner).clear();
        Ok(Box::new(MemoryWriter {
            cursor: Cursor::new(Vec::new()),
            target: Arc::clone(&self.data),
            _guard: HandleGuard::new(&self.handles),
        }))
    }
}

struct MemoryReader {
    cursor: Cursor<Vec<u8>>,
    _guard: HandleGuard,
}

impl Read for MemoryReader {
    fn read(&mut self, buf: &mut [u8]) -> IoResult<usize> {
        self.cursor.read(buf)
    }
}

impl Seek for MemoryReader {
    fn seek(&mut self, pos: SeekFrom) -> IoResult<u64> {
        self.cursor.seek(pos)
    }
}

/// Writes land in a private buffer and are committed to the shared one on
/// every flush, and finally on drop.
struct MemoryWriter {
    cursor: Cursor<Vec<u8>>,
    target: Arc<RwLock<Vec<u8>>>,
    _guard: HandleGuard,
}

impl MemoryWriter {
    fn commit(&self) {
        let mut target = self.target.write().unwrap_or_else(PoisonError::into_inner);
        target.clone_from(self.cursor.get_ref());
    }
}

impl Write for MemoryWriter {
    fn write(&mut self, buf: &[u8]) -> IoResult<usize> {
        self.cursor.write(buf)
    }

    fn flush(&mut self) -> IoResult<()> {
        self.commit();
        Ok(())
    }
}

impl Seek for MemoryWriter {
    fn seek(&mut self, pos: SeekFrom) -> IoResult<u64> {
        self.cursor.seek(pos)
    }
}

impl Drop for MemoryWriter {
    fn drop(&mut self) {
        self.commit();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_contents() {
        let resource = MemoryResource::new("backups/export.json");
        let observer = resource.clone();
        assert_eq!(resource.display_name(), "export.json");

        let mut writer = resource.writer().unwrap();
        writer.write_all(b"{\"tome\":{}}").unwrap();
        assert_eq!(observer.open_handles(), 1);
        drop(writer);

        assert_eq!(observer.bytes(), b"{\"tome\":{}}");
        assert_eq!(observer.opened(), 1);
        assert_eq!(observer.open_handles(), 0);
    }

    #[test]
    fn test_readers_are_independent() {
        let resource = MemoryResource::with_bytes("data.csv", b"\"_id\",\"title\"".to_vec());
        let mut first = resource.reader().unwrap();
        let mut second = resource.reader().unwrap();
        let mut head = [0u8; 5];
        first.read_exact(&mut head).unwrap();
        assert_eq!(&head, b"\"_id\"");
        second.seek(SeekFrom::Start(6)).unwrap();
        second.read_exact(&mut head).unwrap();
        assert_eq!(&head, b"\"titl");
        drop((first, second));
        assert_eq!(resource.closed(), 2);
    }

    #[test]
    #[should_panic]
    fn test_invalid_name_panics() {
        MemoryResource::new("../escape");
    }
}
