//! The shared read loop for entry-based containers.

use super::{Close, ContainerReader, ReadRequest};
use crate::codec::{CodecRegistry, Entry, ReadContext, RecordReader};
use crate::error::{ErrorKind, Result};
use crate::progress::ProgressReporter;
use crate::{MetaData, Outcome, ReadResults, RecordEncoding, RecordType};
use std::io::Read;
use time::OffsetDateTime;

/// One stored entry, positioned at its first byte.
pub(crate) struct RawEntry<'a> {
    pub name: String,
    pub modified: Option<OffsetDateTime>,
    pub reader: Box<dyn Read + 'a>,
}

/// How a concrete container exposes its entries.
pub(crate) trait EntrySource: Send {
    /// Open the stream and check its structure. Must not read every entry.
    fn open(&mut self) -> Result<()>;

    /// An envelope for containers that do not store one.
    fn synthetic_metadata(&mut self) -> Result<Option<MetaData>> {
        Ok(None)
    }

    /// Number of stored entries, when known up front.
    fn entry_count(&self) -> Option<u64> {
        None
    }

    /// Start enumerating from the first entry again.
    fn rewind(&mut self) -> Result<()>;

    /// The next entry in stored order.
    fn next_entry(&mut self) -> Result<Option<RawEntry<'_>>>;

    /// Drop the underlying stream.
    fn release(&mut self) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Unopened,
    Validated,
    Active,
    Closed,
}

/// A [`ContainerReader`] over any [`EntrySource`].
pub(crate) struct ArchiveReader<S> {
    source: S,
    state: State,
    metadata: Option<MetaData>,
}

impl<S: EntrySource> ArchiveReader<S> {
    pub(crate) fn new(source: S) -> Self {
        Self { source, state: State::Unopened, metadata: None }
    }

    fn ensure_open(&mut self) -> Result<()> {
        match self.state {
            State::Unopened => self.validate(),
            State::Closed => exn::bail!(ErrorKind::Contract("container is already closed")),
            State::Validated | State::Active => Ok(()),
        }
    }

    /// Find the envelope entry and decode it.
    fn scan_metadata(&mut self) -> Result<Option<MetaData>> {
        if let Some(metadata) = self.source.synthetic_metadata()? {
            return Ok(Some(metadata));
        }
        let mut registry = CodecRegistry::new();
        self.source.rewind()?;
        while let Some(mut raw) = self.source.next_entry()? {
            if RecordType::resolve(&raw.name) != Some(RecordType::MetaData) {
                continue;
            }
            let readable = |encoding: &RecordEncoding| CodecRegistry::can_read(RecordType::MetaData, *encoding);
            let Some(encoding) = RecordEncoding::detect(&raw.name).filter(readable) else {
                continue;
            };
            let Some(mut codec) = registry.new_reader(RecordType::MetaData, encoding, &Default::default(), Default::default())?
            else {
                continue;
            };
            let mut entry = Entry::new(&raw.name, RecordType::MetaData, encoding, raw.modified, &mut *raw.reader);
            if let Some(metadata) = codec.read_metadata(&mut entry)? {
                return Ok(Some(metadata));
            }
        }
        Ok(None)
    }
}

impl<S: EntrySource> Close for ArchiveReader<S> {
    fn close(&mut self) -> Result<()> {
        if self.state == State::Closed {
            return Ok(());
        }
        let opened = self.state != State::Unopened;
        self.state = State::Closed;
        match opened {
            true => self.source.release(),
            false => Ok(()),
        }
    }
}

impl<S: EntrySource> ContainerReader for ArchiveReader<S> {
    #[tracing::instrument(level = "debug", skip_all)]
    fn validate(&mut self) -> Result<()> {
        match self.state {
            State::Unopened => {
                self.source.open()?;
                self.state = State::Validated;
                Ok(())
            },
            State::Closed => exn::bail!(ErrorKind::Contract("container is already closed")),
            State::Validated | State::Active => Ok(()),
        }
    }

    fn read_metadata(&mut self) -> Result<Option<MetaData>> {
        self.ensure_open()?;
        if self.metadata.is_none() {
            self.metadata = self.scan_metadata()?;
        }
        Ok(self.metadata.clone())
    }

    #[tracing::instrument(level = "debug", skip_all, fields(records_skipped, cancelled))]
    fn read(&mut self, request: &ReadRequest<'_>) -> Result<Outcome<ReadResults>> {
        self.ensure_open()?;
        let Some(metadata) = self.read_metadata()? else {
            exn::bail!(ErrorKind::Format(None));
        };
        metadata.validate()?;

        let allowed = RecordType::expand(request.options.record_types());
        let policy = request.options.update_policy();
        let progress = ProgressReporter::new(request.progress);
        match metadata.book_count() {
            Some(books) => progress.grow_max(books + metadata.cover_count().unwrap_or(0)),
            None => progress.grow_max(self.source.entry_count().unwrap_or(0)),
        }
        let context = ReadContext { catalog: request.catalog, progress: &progress };

        let mut registry = CodecRegistry::new();
        let mut covers = match allowed.contains(&RecordType::Cover) {
            true => registry.new_reader(RecordType::Cover, RecordEncoding::Image, &allowed, policy)?,
            false => None,
        };
        let mut results = ReadResults::default();
        self.source.rewind()?;
        self.state = State::Active;

        // Running out of entries means everything was read, cancelled or not.
        let cancelled = loop {
            let Some(mut raw) = self.source.next_entry()? else {
                break false;
            };
            if request.cancel.is_cancelled() {
                break true;
            }
            // Images are always covers, whatever their name starts with.
            let encoding = RecordEncoding::detect(&raw.name);
            let record_type = match encoding {
                Some(RecordEncoding::Image) => Some(RecordType::Cover),
                _ => RecordType::resolve(&raw.name),
            };
            let (record_type, encoding) = match (record_type, encoding) {
                (Some(ty), Some(encoding)) => (ty, encoding),
                _ => {
                    tracing::debug!(entry = %raw.name, "skipping unrecognised entry");
                    results.records_skipped += 1;
                    continue;
                },
            };
            let bundled = record_type == RecordType::AutoDetect;
            if record_type == RecordType::MetaData || (!bundled && !allowed.contains(&record_type)) {
                continue;
            }
            let mut entry = Entry::new(&raw.name, record_type, encoding, raw.modified, &mut *raw.reader);
            let record = match covers.as_mut() {
                Some(codec) if record_type == RecordType::Cover => codec.read(&mut entry, &context)?,
                _ => match registry.new_reader(record_type, encoding, &allowed, policy)? {
                    Some(mut codec) => codec.read(&mut entry, &context)?,
                    None => {
                        tracing::debug!(entry = %raw.name, "no reader for entry");
                        results.records_skipped += 1;
                        continue;
                    },
                },
            };
            results += record;
        };

        let span = tracing::Span::current();
        span.record("records_skipped", results.records_skipped);
        span.record("cancelled", cancelled);
        Ok(match cancelled {
            true => Outcome::Cancelled(results),
            false => Outcome::Completed(results),
        })
    }
}
