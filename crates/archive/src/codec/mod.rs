//! Per-record codecs.
//!
//! A [`RecordReader`] decodes one container entry into catalog calls; a
//! [`RecordWriter`] encodes catalog entities into one entry. Neither owns the
//! underlying stream: readers only ever see `&mut dyn Read`, so they cannot
//! close what the container opened.

mod cover;
mod csv;
mod import;
mod json;
mod registry;
mod xml;

pub(crate) use self::import::Importer;
pub use self::registry::CodecRegistry;
use crate::error::Result;
use crate::progress::ProgressReporter;
use crate::{MetaData, ReadResults, RecordEncoding, RecordType, WriteResults};
use std::io::{Read, Write};
use time::OffsetDateTime;
use tome_catalog::Catalog;

/// One container entry, positioned at its first byte.
pub struct Entry<'a> {
    name: &'a str,
    record_type: RecordType,
    encoding: RecordEncoding,
    modified: Option<OffsetDateTime>,
    reader: &'a mut dyn Read,
}

impl<'a> Entry<'a> {
    pub fn new(
        name: &'a str,
        record_type: RecordType,
        encoding: RecordEncoding,
        modified: Option<OffsetDateTime>,
        reader: &'a mut dyn Read,
    ) -> Self {
        Self { name, record_type, encoding, modified, reader }
    }

    pub fn name(&self) -> &str {
        self.name
    }

    pub fn record_type(&self) -> RecordType {
        self.record_type
    }

    pub fn encoding(&self) -> RecordEncoding {
        self.encoding
    }

    /// Modification time stored by the container, if it keeps one.
    pub fn modified(&self) -> Option<OffsetDateTime> {
        self.modified
    }

    pub fn reader(&mut self) -> &mut dyn Read {
        self.reader
    }
}

/// Collaborators available while reading a record.
pub struct ReadContext<'a> {
    pub(crate) catalog: &'a dyn Catalog,
    pub(crate) progress: &'a ProgressReporter<'a>,
}

/// Collaborators available while writing a record.
pub struct WriteContext<'a> {
    pub(crate) catalog: &'a dyn Catalog,
    pub(crate) progress: &'a ProgressReporter<'a>,
    /// Name of the single entity to write, for records holding one entity
    /// (covers).
    pub(crate) subject: Option<&'a str>,
}

/// Decodes one entry.
pub trait RecordReader: Send {
    /// Decode the envelope. Only codecs that understand the MetaData record
    /// return anything.
    fn read_metadata(&mut self, _entry: &mut Entry<'_>) -> Result<Option<MetaData>> {
        Ok(None)
    }

    /// Decode the entry, materialising entities through the catalog.
    ///
    /// A malformed entity is counted as failed and reading carries on; a
    /// malformed record (the entry as a whole cannot be parsed) is an error.
    fn read(&mut self, entry: &mut Entry<'_>, context: &ReadContext<'_>) -> Result<ReadResults>;
}

/// Encodes one entry.
pub trait RecordWriter: Send {
    fn write_metadata(&mut self, out: &mut dyn Write, metadata: &MetaData) -> Result<()>;

    /// Encode every entity of `record_type` into `out`.
    fn write(&mut self, out: &mut dyn Write, record_type: RecordType, context: &WriteContext<'_>) -> Result<WriteResults>;

    /// Modification time of the single entity written last, for containers
    /// that stamp each entry.
    fn modified(&self) -> Option<OffsetDateTime> {
        None
    }
}
