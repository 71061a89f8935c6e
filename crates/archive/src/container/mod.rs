//! Containers: the outer archive, its entries, and their lifecycle.
//!
//! A container reader walks entries in stored order and hands each to the
//! record codec its name resolves to. A container writer emits the envelope
//! first and then one entry per record type, dependencies before dependents.
//! Both check for cancellation between entries only.

mod csv;
mod json;
mod reader;
#[cfg(feature = "sqlite")]
mod sqlite;
mod writer;
mod zip;

pub(crate) use self::reader::{ArchiveReader, EntrySource, RawEntry};
pub(crate) use self::writer::{ArchiveWriter, EntrySink};
use crate::cancel::CancellationToken;
use crate::error::{ErrorKind, Result};
use crate::options::{ExportOptions, ImportOptions};
use crate::progress::ProgressListener;
use crate::{ContainerFormat, MetaData, Outcome, ReadResults, WriteResults};
use std::collections::HashMap;
use std::sync::LazyLock;
use tome_catalog::Catalog;
use tome_storage::ResourceHandle;

/// Releases whatever a container opened. Idempotent: closing twice, or after
/// a failure, is a no-op.
pub trait Close {
    fn close(&mut self) -> Result<()>;
}

/// Everything a container needs for one full read.
pub struct ReadRequest<'a> {
    pub catalog: &'a dyn Catalog,
    pub options: &'a ImportOptions,
    pub progress: &'a dyn ProgressListener,
    pub cancel: &'a CancellationToken,
}

/// Everything a container needs for one full write.
pub struct WriteRequest<'a> {
    pub catalog: &'a dyn Catalog,
    pub options: &'a ExportOptions,
    pub progress: &'a dyn ProgressListener,
    pub cancel: &'a CancellationToken,
}

/// Lifecycle: unopened, validated, envelope read (optional), reading, closed.
pub trait ContainerReader: Close + Send {
    /// Cheap structural check. Never reads the whole stream.
    fn validate(&mut self) -> Result<()>;

    /// Read the envelope only. Validates first if that has not happened yet.
    fn read_metadata(&mut self) -> Result<Option<MetaData>>;

    /// Read every entry. Validates first if that has not happened yet.
    fn read(&mut self, request: &ReadRequest<'_>) -> Result<Outcome<ReadResults>>;
}

pub trait ContainerWriter: Close + Send {
    fn write(&mut self, request: &WriteRequest<'_>) -> Result<Outcome<WriteResults>>;
}

type ReaderFactory = fn(ResourceHandle) -> Box<dyn ContainerReader>;
type WriterFactory = fn(ResourceHandle) -> Box<dyn ContainerWriter>;

/// How one container format is opened. Formats without a writer are read
/// only.
struct Registration {
    reader: ReaderFactory,
    writer: Option<WriterFactory>,
}

fn zip_reader(resource: ResourceHandle) -> Box<dyn ContainerReader> {
    Box::new(ArchiveReader::new(self::zip::ZipSource::new(resource)))
}

fn zip_writer(resource: ResourceHandle) -> Box<dyn ContainerWriter> {
    Box::new(ArchiveWriter::new(self::zip::ZipSink::new(resource)))
}

fn json_reader(resource: ResourceHandle) -> Box<dyn ContainerReader> {
    Box::new(ArchiveReader::new(self::json::JsonSource::new(resource)))
}

fn json_writer(resource: ResourceHandle) -> Box<dyn ContainerWriter> {
    Box::new(ArchiveWriter::new(self::json::JsonSink::new(resource)))
}

fn csv_reader(resource: ResourceHandle) -> Box<dyn ContainerReader> {
    Box::new(ArchiveReader::new(self::csv::CsvSource::new(resource)))
}

#[cfg(feature = "sqlite")]
fn sqlite_reader(resource: ResourceHandle) -> Box<dyn ContainerReader> {
    Box::new(self::sqlite::SqliteReader::new(resource))
}

static CONTAINERS: LazyLock<HashMap<ContainerFormat, Registration>> = LazyLock::new(|| {
    let containers = [
        (ContainerFormat::Zip, Registration { reader: zip_reader, writer: Some(zip_writer) }),
        (ContainerFormat::Json, Registration { reader: json_reader, writer: Some(json_writer) }),
        (ContainerFormat::CsvLegacy, Registration { reader: csv_reader, writer: None }),
    ];
    #[cfg(feature = "sqlite")]
    let containers = containers.into_iter().chain([(ContainerFormat::Sqlite, Registration { reader: sqlite_reader, writer: None })]);
    containers.into_iter().collect()
});

impl ContainerFormat {
    /// Whether archives of this format can be written.
    #[must_use]
    pub fn is_writable(&self) -> bool {
        CONTAINERS.get(self).is_some_and(|registration| registration.writer.is_some())
    }

    /// Create an unopened reader for this format.
    pub fn open_reader(self, resource: ResourceHandle) -> Result<Box<dyn ContainerReader>> {
        match CONTAINERS.get(&self) {
            Some(registration) => Ok((registration.reader)(resource)),
            None => exn::bail!(ErrorKind::format(format!("{self} archives cannot be read by this build"))),
        }
    }

    /// Create an unopened writer for this format. Read-only formats fail here,
    /// before the resource is touched.
    pub fn open_writer(self, resource: ResourceHandle) -> Result<Box<dyn ContainerWriter>> {
        match CONTAINERS.get(&self).and_then(|registration| registration.writer) {
            Some(writer) => Ok(writer(resource)),
            None => exn::bail!(ErrorKind::format(format!("{self} archives are read only"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::sync::Arc;
    use tome_storage::MemoryResource;

    #[test]
    fn test_read_only_formats_fail_fast() {
        let resource = MemoryResource::new("books.csv");
        let err = ContainerFormat::CsvLegacy.open_writer(Arc::new(resource.clone())).err().unwrap();
        assert_eq!(*err, ErrorKind::format("csv archives are read only"));
        assert_eq!(resource.opened(), 0);
    }

    #[rstest]
    #[case(ContainerFormat::Zip, true, true)]
    #[case(ContainerFormat::Json, true, true)]
    #[case(ContainerFormat::CsvLegacy, true, false)]
    #[case(ContainerFormat::Sqlite, cfg!(feature = "sqlite"), false)]
    fn test_registered_containers(#[case] format: ContainerFormat, #[case] readable: bool, #[case] writable: bool) {
        assert_eq!(format.is_writable(), writable);
        let resource: ResourceHandle = Arc::new(MemoryResource::new(format!("backup.{}", format.extension())));
        assert_eq!(format.open_reader(Arc::clone(&resource)).is_ok(), readable);
        assert_eq!(format.open_writer(resource).is_ok(), writable);
    }
}
