//! Which codec handles which record, in which encoding.

use super::cover::{CoverRecordReader, CoverRecordWriter};
use super::csv::{CsvRecordReader, CsvRecordWriter};
use super::json::{JsonRecordReader, JsonRecordWriter};
use super::xml::XmlRecordReader;
use super::{RecordReader, RecordWriter};
use crate::error::{ErrorKind, Result};
use crate::{RecordEncoding, RecordType, UpdatePolicy};
use std::collections::{BTreeSet, HashMap};
use std::sync::LazyLock;
use time::OffsetDateTime;

type ReaderFactory = fn(BTreeSet<RecordType>, UpdatePolicy) -> Box<dyn RecordReader>;
type WriterFactory = fn(Option<OffsetDateTime>) -> Box<dyn RecordWriter>;

/// Text records every JSON codec understands.
const JSON_RECORDS: [RecordType; 9] = [
    RecordType::MetaData,
    RecordType::Styles,
    RecordType::Preferences,
    RecordType::Certificates,
    RecordType::Bookshelves,
    RecordType::Libraries,
    RecordType::CustomFields,
    RecordType::DeletedBooks,
    RecordType::Books,
];

fn json_reader(allowed: BTreeSet<RecordType>, policy: UpdatePolicy) -> Box<dyn RecordReader> {
    Box::new(JsonRecordReader::new(allowed, policy))
}

fn csv_reader(allowed: BTreeSet<RecordType>, policy: UpdatePolicy) -> Box<dyn RecordReader> {
    Box::new(CsvRecordReader::new(allowed, policy))
}

fn xml_reader(allowed: BTreeSet<RecordType>, policy: UpdatePolicy) -> Box<dyn RecordReader> {
    Box::new(XmlRecordReader::new(allowed, policy))
}

fn cover_reader(allowed: BTreeSet<RecordType>, policy: UpdatePolicy) -> Box<dyn RecordReader> {
    Box::new(CoverRecordReader::new(allowed, policy))
}

fn json_writer(since: Option<OffsetDateTime>) -> Box<dyn RecordWriter> {
    Box::new(JsonRecordWriter::new(since))
}

fn csv_writer(since: Option<OffsetDateTime>) -> Box<dyn RecordWriter> {
    Box::new(CsvRecordWriter::new(since))
}

fn cover_writer(_since: Option<OffsetDateTime>) -> Box<dyn RecordWriter> {
    Box::new(CoverRecordWriter::default())
}

static READERS: LazyLock<HashMap<(RecordType, RecordEncoding), ReaderFactory>> = LazyLock::new(|| {
    let json = JSON_RECORDS
        .into_iter()
        .chain([RecordType::AutoDetect])
        .map(|ty| ((ty, RecordEncoding::Json), json_reader as ReaderFactory));
    let xml = [RecordType::MetaData, RecordType::Styles, RecordType::Preferences, RecordType::AutoDetect]
        .into_iter()
        .map(|ty| ((ty, RecordEncoding::Xml), xml_reader as ReaderFactory));
    json.chain(xml)
        .chain([
            ((RecordType::Books, RecordEncoding::Csv), csv_reader as ReaderFactory),
            ((RecordType::Cover, RecordEncoding::Image), cover_reader as ReaderFactory),
        ])
        .collect()
});

static WRITERS: LazyLock<HashMap<(RecordType, RecordEncoding), WriterFactory>> = LazyLock::new(|| {
    JSON_RECORDS
        .into_iter()
        .map(|ty| ((ty, RecordEncoding::Json), json_writer as WriterFactory))
        .chain([
            ((RecordType::Books, RecordEncoding::Csv), csv_writer as WriterFactory),
            ((RecordType::Cover, RecordEncoding::Image), cover_writer as WriterFactory),
        ])
        .collect()
});

/// Hands out record codecs for one session.
///
/// A registry is not shared between sessions: it remembers that the cover
/// reader was handed out, and refuses to build a second one. Covers are by
/// far the most numerous entries, so a single reader is created up front and
/// reused for every one of them.
#[derive(Debug, Default)]
pub struct CodecRegistry {
    cover_reader_issued: bool,
}

impl CodecRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether entries of `record_type` stored as `encoding` can be decoded.
    pub fn can_read(record_type: RecordType, encoding: RecordEncoding) -> bool {
        READERS.contains_key(&(record_type, encoding))
    }

    /// Whether `record_type` can be encoded as `encoding`.
    pub fn can_write(record_type: RecordType, encoding: RecordEncoding) -> bool {
        WRITERS.contains_key(&(record_type, encoding))
    }

    /// A writer encoding `record_type` as `encoding`, limited to entities
    /// modified at or after `since` when given.
    pub fn new_writer(
        &self,
        record_type: RecordType,
        encoding: RecordEncoding,
        since: Option<OffsetDateTime>,
    ) -> Result<Box<dyn RecordWriter>> {
        match WRITERS.get(&(record_type, encoding)) {
            Some(factory) => Ok(factory(since)),
            None => exn::bail!(ErrorKind::format(format!("no writer available for {record_type} as {encoding}"))),
        }
    }

    /// A reader for `record_type` entries stored as `encoding`, or `None`
    /// when nothing can decode them.
    ///
    /// Asking for a second cover reader is a contract violation.
    pub fn new_reader(
        &mut self,
        record_type: RecordType,
        encoding: RecordEncoding,
        allowed: &BTreeSet<RecordType>,
        policy: UpdatePolicy,
    ) -> Result<Option<Box<dyn RecordReader>>> {
        let Some(factory) = READERS.get(&(record_type, encoding)) else {
            return Ok(None);
        };
        if record_type == RecordType::Cover {
            if self.cover_reader_issued {
                exn::bail!(ErrorKind::Contract("cover reader must be created once per session and reused"));
            }
            self.cover_reader_issued = true;
        }
        Ok(Some(factory(allowed.clone(), policy)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_cover_reader_is_created_once() {
        let mut registry = CodecRegistry::new();
        let allowed = BTreeSet::from([RecordType::Cover]);
        assert!(registry.new_reader(RecordType::Cover, RecordEncoding::Image, &allowed, UpdatePolicy::Skip).unwrap().is_some());
        let err = registry.new_reader(RecordType::Cover, RecordEncoding::Image, &allowed, UpdatePolicy::Skip).err().unwrap();
        assert!(matches!(*err, ErrorKind::Contract(_)));
        // Text readers are cheap and can be made per entry.
        for _ in 0..2 {
            assert!(registry.new_reader(RecordType::Books, RecordEncoding::Json, &allowed, UpdatePolicy::Skip).unwrap().is_some());
        }
    }

    #[test]
    fn test_missing_writer_fails_fast() {
        let registry = CodecRegistry::new();
        let err = registry.new_writer(RecordType::Styles, RecordEncoding::Xml, None).err().unwrap();
        assert_eq!((*err).to_string(), "no writer available for styles as xml");
        assert!(registry.new_writer(RecordType::Styles, RecordEncoding::Json, None).is_ok());
    }

    #[test]
    fn test_missing_reader_is_none() {
        let mut registry = CodecRegistry::new();
        let allowed = BTreeSet::from([RecordType::Bookshelves]);
        let reader = registry.new_reader(RecordType::Bookshelves, RecordEncoding::Csv, &allowed, UpdatePolicy::Skip).unwrap();
        assert!(reader.is_none());
    }

    #[rstest]
    #[case(RecordType::Books, RecordEncoding::Json, true, true)]
    #[case(RecordType::Books, RecordEncoding::Csv, true, true)]
    #[case(RecordType::Bookshelves, RecordEncoding::Csv, false, false)]
    #[case(RecordType::Styles, RecordEncoding::Xml, true, false)]
    #[case(RecordType::AutoDetect, RecordEncoding::Json, true, false)]
    #[case(RecordType::MetaData, RecordEncoding::Xml, true, false)]
    #[case(RecordType::Cover, RecordEncoding::Image, true, true)]
    #[case(RecordType::Cover, RecordEncoding::Json, false, false)]
    #[case(RecordType::Books, RecordEncoding::Image, false, false)]
    #[case(RecordType::Database, RecordEncoding::Json, false, false)]
    fn test_registered_codecs(
        #[case] record_type: RecordType,
        #[case] encoding: RecordEncoding,
        #[case] readable: bool,
        #[case] writable: bool,
    ) {
        assert_eq!(CodecRegistry::can_read(record_type, encoding), readable);
        assert_eq!(CodecRegistry::can_write(record_type, encoding), writable);
    }
}
