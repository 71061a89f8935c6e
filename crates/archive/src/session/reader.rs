use super::{LiveHandle, Scope, lock};
use crate::container::ReadRequest;
use crate::error::{ErrorKind, Result};
use crate::options::ImportOptions;
use crate::progress::ProgressListener;
use crate::{CancellationToken, ContainerFormat, MetaData, Outcome, ReadResults};
use exn::OptionExt;
use std::sync::Mutex;
use tome_catalog::Catalog;
use tome_storage::{Location, ResourceHandle};

/// Restores a catalog from one archive.
///
/// The container format is detected from the resource on every open unless
/// it was pinned with [`with_format`](Self::with_format).
pub struct ReaderSession {
    resource: ResourceHandle,
    options: ImportOptions,
    format: Option<ContainerFormat>,
    running: Mutex<()>,
    live: LiveHandle,
    metadata: Mutex<Option<MetaData>>,
}

impl ReaderSession {
    pub fn new(resource: ResourceHandle, options: ImportOptions) -> Self {
        Self {
            resource,
            options,
            format: None,
            running: Mutex::new(()),
            live: LiveHandle::default(),
            metadata: Mutex::new(None),
        }
    }

    /// Open a local path (or `file://` locator).
    pub fn from_locator(locator: &str, options: ImportOptions) -> Result<Self> {
        let location = Location::parse(locator).map_err(ErrorKind::storage)?;
        let resource = tome_storage::resource::open(&location).map_err(ErrorKind::storage)?;
        Ok(Self::new(resource, options))
    }

    /// Skip detection and always open the resource as `format`.
    pub fn with_format(mut self, format: ContainerFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn options(&self) -> &ImportOptions {
        &self.options
    }

    pub fn resource(&self) -> &ResourceHandle {
        &self.resource
    }

    /// The envelope seen by the most recent envelope read or run.
    pub fn metadata(&self) -> Option<MetaData> {
        lock(&self.metadata).clone()
    }

    fn format(&self) -> Result<ContainerFormat> {
        match self.format {
            Some(format) => Ok(format),
            None => ContainerFormat::detect(self.resource.as_ref())?.ok_or_raise(|| ErrorKind::Format(None)),
        }
    }

    /// Open a fresh container, read the envelope, and close it again.
    ///
    /// A later [`run`](Self::run) opens its own container; nothing read here
    /// is reused.
    #[tracing::instrument(level = "debug", skip_all, fields(resource = self.resource.display_name()))]
    pub fn read_metadata(&self) -> Result<Option<MetaData>> {
        let _running = lock(&self.running);
        let format = self.format()?;
        let mut scope = Scope::open(&self.live, CancellationToken::new(), || format.open_reader(self.resource.clone()))?;
        let read = scope.container().read_metadata();
        let closed = scope.close();
        let metadata = read?;
        closed?;
        if let Some(metadata) = &metadata {
            metadata.validate()?;
        }
        *lock(&self.metadata) = metadata.clone();
        Ok(metadata)
    }

    /// Read the whole archive into `catalog`.
    ///
    /// The container is closed exactly once whether this completes, fails or
    /// is cancelled.
    pub fn run(&self, catalog: &dyn Catalog, progress: &dyn ProgressListener) -> Result<Outcome<ReadResults>> {
        self.run_with(catalog, progress, CancellationToken::new())
    }

    /// [`run`](Self::run), stopping at the next entry once `cancel` fires.
    ///
    /// `cancel` may already be cancelled, in which case nothing is imported.
    #[tracing::instrument(level = "debug", skip_all, fields(resource = self.resource.display_name(), format))]
    pub fn run_with(
        &self,
        catalog: &dyn Catalog,
        progress: &dyn ProgressListener,
        cancel: CancellationToken,
    ) -> Result<Outcome<ReadResults>> {
        let _running = lock(&self.running);
        let format = self.format()?;
        tracing::Span::current().record("format", format.as_str());
        let mut scope = Scope::open(&self.live, cancel, || format.open_reader(self.resource.clone()))?;
        let token = scope.token().clone();
        let outcome = match scope.container().read_metadata() {
            Ok(metadata) => {
                *lock(&self.metadata) = metadata;
                let request = ReadRequest { catalog, options: &self.options, progress, cancel: &token };
                scope.container().read(&request)
            },
            Err(err) => Err(err),
        };
        let closed = scope.close();
        let outcome = outcome?;
        closed?;
        let results = outcome.results();
        tracing::info!(
            cancelled = outcome.is_cancelled(),
            books = results.books.processed,
            covers = results.covers.processed,
            failed = results.failed(),
            skipped_records = results.records_skipped,
            "restore finished",
        );
        Ok(outcome)
    }

    /// Ask the open container, if any, to stop at the next entry.
    pub fn cancel(&self) {
        if !self.live.cancel() {
            tracing::debug!("nothing to cancel");
        }
    }
}
