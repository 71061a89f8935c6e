//! JSON records: `{"<type>": [...]}` per entry, or several sections at once in
//! an AutoDetect (`data.json`) entry. The envelope is a flat object.

use super::{Entry, Importer, ReadContext, RecordReader, RecordWriter, WriteContext};
use crate::consts::BUFFER_SIZE;
use crate::error::{ErrorKind, Result};
use crate::{MetaData, ReadResults, RecordType, UpdatePolicy, WriteResults};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::io::{BufReader, BufWriter, Write};
use time::OffsetDateTime;
use tome_catalog::{Book, Bookshelf, Certificate, CustomField, DeletedBook, Library, Preferences, Style};

/// Sections in the order they must be applied.
const SECTIONS: [RecordType; 8] = [
    RecordType::Styles,
    RecordType::CustomFields,
    RecordType::Preferences,
    RecordType::Certificates,
    RecordType::Bookshelves,
    RecordType::Libraries,
    RecordType::DeletedBooks,
    RecordType::Books,
];

pub(crate) struct JsonRecordReader {
    allowed: BTreeSet<RecordType>,
    policy: UpdatePolicy,
}

impl JsonRecordReader {
    pub(crate) fn new(allowed: BTreeSet<RecordType>, policy: UpdatePolicy) -> Self {
        Self { allowed, policy }
    }
}

/// Decode each array element on its own, so one bad element only fails
/// itself.
fn each<T: DeserializeOwned>(
    importer: &mut Importer<'_>,
    ty: RecordType,
    section: Value,
    mut apply: impl FnMut(&mut Importer<'_>, usize, T),
) {
    let Value::Array(items) = section else {
        importer.failed(ty, 0, format!("expected a list of {ty}"));
        return;
    };
    for (index, item) in items.into_iter().enumerate() {
        match serde_json::from_value::<T>(item) {
            Ok(entity) => apply(importer, index, entity),
            Err(err) => importer.failed(ty, index, err),
        }
    }
}

impl JsonRecordReader {
    fn apply_section(&self, importer: &mut Importer<'_>, ty: RecordType, section: Value, context: &ReadContext<'_>) {
        match ty {
            RecordType::Styles => each::<Style>(importer, ty, section, |i, n, style| i.style(n, &style)),
            RecordType::CustomFields => {
                each::<CustomField>(importer, ty, section, |i, n, field| i.custom_field(n, &field))
            },
            RecordType::Preferences => match serde_json::from_value::<Preferences>(section) {
                Ok(preferences) => importer.preferences(&preferences),
                Err(err) => importer.failed(ty, 0, err),
            },
            RecordType::Certificates => {
                each::<Certificate>(importer, ty, section, |i, n, certificate| i.certificate(n, &certificate))
            },
            RecordType::Bookshelves => each::<Bookshelf>(importer, ty, section, |i, n, shelf| i.bookshelf(n, &shelf)),
            RecordType::Libraries => each::<Library>(importer, ty, section, |i, n, library| i.library(n, &library)),
            RecordType::DeletedBooks => {
                each::<DeletedBook>(importer, ty, section, |i, n, marker| i.deleted_book(n, &marker))
            },
            RecordType::Books => {
                if let Value::Array(items) = &section {
                    context.progress.grow_max(context.progress.position() + items.len() as u64);
                }
                each::<Book>(importer, ty, section, |i, n, book| {
                    i.book(n, &book);
                    context.progress.advance(1, Some(&book.title));
                })
            },
            _ => tracing::debug!(record = %ty, "section has no JSON decoding"),
        }
    }
}

impl RecordReader for JsonRecordReader {
    fn read_metadata(&mut self, entry: &mut Entry<'_>) -> Result<Option<MetaData>> {
        if entry.record_type() != RecordType::MetaData {
            return Ok(None);
        }
        let metadata: MetaData =
            serde_json::from_reader(BufReader::with_capacity(BUFFER_SIZE, entry.reader())).map_err(ErrorKind::json)?;
        Ok(Some(metadata))
    }

    #[tracing::instrument(level = "debug", skip_all, fields(entry = entry.name()))]
    fn read(&mut self, entry: &mut Entry<'_>, context: &ReadContext<'_>) -> Result<ReadResults> {
        let root: Value =
            serde_json::from_reader(BufReader::with_capacity(BUFFER_SIZE, entry.reader())).map_err(ErrorKind::json)?;
        let mut importer = Importer::new(context.catalog, &self.allowed, self.policy);
        let record_type = entry.record_type();
        let mut sections = match root {
            Value::Object(map) => map,
            // A bare list is accepted for single-type records.
            list @ Value::Array(_) if record_type != RecordType::AutoDetect => {
                Map::from_iter([(record_type.prefix().to_string(), list)])
            },
            _ => exn::bail!(ErrorKind::format(format!("{} is not a JSON object", entry.name()))),
        };
        for ty in SECTIONS {
            let wanted = match record_type {
                RecordType::AutoDetect => importer.allows(ty),
                _ => ty == record_type,
            };
            if !wanted {
                continue;
            }
            if let Some(section) = sections.remove(ty.prefix()) {
                self.apply_section(&mut importer, ty, section, context);
            }
        }
        if !sections.is_empty() {
            tracing::debug!(entry = entry.name(), ignored = ?sections.keys().collect::<Vec<_>>(), "ignoring sections");
        }
        Ok(importer.finish())
    }
}

pub(crate) struct JsonRecordWriter {
    since: Option<OffsetDateTime>,
}

impl JsonRecordWriter {
    pub(crate) fn new(since: Option<OffsetDateTime>) -> Self {
        Self { since }
    }
}

/// Write `{"<type>":<items>}` straight to the output.
fn write_section<T: Serialize + ?Sized>(out: &mut dyn Write, ty: RecordType, items: &T) -> Result<()> {
    let mut out = BufWriter::with_capacity(BUFFER_SIZE, out);
    write!(out, "{{\"{}\":", ty.prefix()).map_err(ErrorKind::io)?;
    serde_json::to_writer(&mut out, items).map_err(ErrorKind::json)?;
    out.write_all(b"}").map_err(ErrorKind::io)?;
    out.flush().map_err(ErrorKind::io)
}

impl RecordWriter for JsonRecordWriter {
    fn write_metadata(&mut self, out: &mut dyn Write, metadata: &MetaData) -> Result<()> {
        serde_json::to_writer(out, metadata).map_err(ErrorKind::json)
    }

    #[tracing::instrument(level = "debug", skip(self, out, context), fields(count))]
    fn write(&mut self, out: &mut dyn Write, record_type: RecordType, context: &WriteContext<'_>) -> Result<WriteResults> {
        let catalog = context.catalog;
        let count = match record_type {
            RecordType::Books => {
                let books = catalog.books(self.since).map_err(ErrorKind::catalog)?;
                context.progress.grow_max(context.progress.position() + books.len() as u64);
                write_section(out, record_type, &books)?;
                context.progress.advance(books.len() as u64, Some("books"));
                books.len()
            },
            RecordType::DeletedBooks => {
                let deleted = catalog.deleted_books(self.since).map_err(ErrorKind::catalog)?;
                write_section(out, record_type, &deleted)?;
                deleted.len()
            },
            RecordType::Bookshelves => {
                let shelves = catalog.bookshelves().map_err(ErrorKind::catalog)?;
                write_section(out, record_type, &shelves)?;
                shelves.len()
            },
            RecordType::Libraries => {
                let libraries = catalog.libraries().map_err(ErrorKind::catalog)?;
                write_section(out, record_type, &libraries)?;
                libraries.len()
            },
            RecordType::CustomFields => {
                let fields = catalog.custom_fields().map_err(ErrorKind::catalog)?;
                write_section(out, record_type, &fields)?;
                fields.len()
            },
            RecordType::Styles => {
                let styles = catalog.styles().map_err(ErrorKind::catalog)?;
                write_section(out, record_type, &styles)?;
                styles.len()
            },
            RecordType::Certificates => {
                let certificates = catalog.certificates().map_err(ErrorKind::catalog)?;
                write_section(out, record_type, &certificates)?;
                certificates.len()
            },
            RecordType::Preferences => {
                let preferences = catalog.preferences().map_err(ErrorKind::catalog)?;
                write_section(out, record_type, &preferences)?;
                preferences.len()
            },
            other => exn::bail!(ErrorKind::format(format!("no JSON encoding for {other} records"))),
        };
        tracing::Span::current().record("count", count);
        let mut results = WriteResults::default();
        if let Some(total) = results.count_mut(record_type) {
            *total += count as u64;
        }
        Ok(results)
    }
}
