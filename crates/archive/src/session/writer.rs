use super::{LiveHandle, Scope};
use crate::container::WriteRequest;
use crate::error::{ErrorKind, Result};
use crate::options::ExportOptions;
use crate::progress::ProgressListener;
use crate::{CancellationToken, CodecRegistry, ContainerFormat, Outcome, RecordType, WriteResults};
use std::sync::Mutex;
use tome_catalog::Catalog;
use tome_storage::{Location, ResourceHandle};

/// Backs a catalog up into one archive.
pub struct WriterSession {
    resource: ResourceHandle,
    format: ContainerFormat,
    options: ExportOptions,
    running: Mutex<()>,
    live: LiveHandle,
}

impl WriterSession {
    /// Fails straight away for formats that can only be read, and for book
    /// encodings nothing can write.
    pub fn new(resource: ResourceHandle, format: ContainerFormat, options: ExportOptions) -> Result<Self> {
        if !format.is_writable() {
            exn::bail!(ErrorKind::format(format!("{format} archives are read only")));
        }
        let encoding = options.book_encoding();
        if !CodecRegistry::can_write(RecordType::Books, encoding) {
            exn::bail!(ErrorKind::format(format!("books cannot be written as {encoding}")));
        }
        Ok(Self { resource, format, options, running: Mutex::new(()), live: LiveHandle::default() })
    }

    pub fn from_locator(locator: &str, format: ContainerFormat, options: ExportOptions) -> Result<Self> {
        let location = Location::parse(locator).map_err(ErrorKind::storage)?;
        let resource = tome_storage::resource::open(&location).map_err(ErrorKind::storage)?;
        Self::new(resource, format, options)
    }

    pub fn format(&self) -> ContainerFormat {
        self.format
    }

    pub fn options(&self) -> &ExportOptions {
        &self.options
    }

    pub fn resource(&self) -> &ResourceHandle {
        &self.resource
    }

    /// Write the whole archive from `catalog`.
    ///
    /// A cancelled backup is still a valid archive holding the entries
    /// written so far. A failed one is abandoned.
    pub fn run(&self, catalog: &dyn Catalog, progress: &dyn ProgressListener) -> Result<Outcome<WriteResults>> {
        self.run_with(catalog, progress, CancellationToken::new())
    }

    /// [`run`](Self::run), stopping before the next entry once `cancel`
    /// fires.
    #[tracing::instrument(level = "debug", skip_all, fields(resource = self.resource.display_name(), format = self.format.as_str()))]
    pub fn run_with(
        &self,
        catalog: &dyn Catalog,
        progress: &dyn ProgressListener,
        cancel: CancellationToken,
    ) -> Result<Outcome<WriteResults>> {
        let _running = super::lock(&self.running);
        let mut scope = Scope::open(&self.live, cancel, || self.format.open_writer(self.resource.clone()))?;
        let token = scope.token().clone();
        let request = WriteRequest { catalog, options: &self.options, progress, cancel: &token };
        let outcome = scope.container().write(&request);
        let closed = scope.close();
        let outcome = outcome?;
        closed?;
        let results = outcome.results();
        tracing::info!(
            cancelled = outcome.is_cancelled(),
            books = results.books,
            covers = results.covers,
            "backup finished",
        );
        Ok(outcome)
    }

    pub fn cancel(&self) {
        if !self.live.cancel() {
            tracing::debug!("nothing to cancel");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RecordEncoding;
    use crate::progress::NoProgress;
    use std::sync::Arc;
    use tome_catalog::{Book, Bookshelf, MemoryCatalog};
    use tome_storage::MemoryResource;

    #[test]
    fn test_read_only_format_fails_fast() {
        let resource = MemoryResource::new("library.db");
        let session = WriterSession::new(Arc::new(resource.clone()), ContainerFormat::Sqlite, ExportOptions::default());
        assert!(session.is_err());
        assert_eq!(resource.opened(), 0);
    }

    #[test]
    fn test_unwritable_book_encoding_fails_fast() {
        let resource = MemoryResource::new("backup.zip");
        let options = ExportOptions::new([RecordType::Books]).with_book_encoding(RecordEncoding::Xml);
        let err = WriterSession::new(Arc::new(resource.clone()), ContainerFormat::Zip, options).err().unwrap();
        assert_eq!(*err, ErrorKind::format("books cannot be written as xml"));
        assert_eq!(resource.opened(), 0);
    }

    #[test]
    fn test_run_closes_once() {
        let resource = MemoryResource::new("backup.zip");
        let catalog = MemoryCatalog::default()
            .with_bookshelves([Bookshelf::new("Fiction")])
            .with_books([Book::new("u-1", "Dune").on_shelf("Fiction")]);
        let session =
            WriterSession::new(Arc::new(resource.clone()), ContainerFormat::Zip, ExportOptions::new([RecordType::Books]))
                .unwrap();
        let results = session.run(&catalog, &NoProgress).unwrap().into_results();
        assert_eq!(results.books, 1);
        assert_eq!(results.bookshelves, 1);
        assert_eq!(resource.open_handles(), 0);
        assert_eq!(ContainerFormat::from_magic_bytes(&resource.bytes()), Some(ContainerFormat::Zip));
    }
}
