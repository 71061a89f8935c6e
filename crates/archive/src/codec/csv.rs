//! CSV book records, compatible with the legacy single-file export.
//!
//! Only books can be stored this way. Multi-valued columns are joined with
//! `|`, and custom field values live in `field:<key>` columns.

use super::{Entry, Importer, ReadContext, RecordReader, RecordWriter, WriteContext};
use crate::consts::BUFFER_SIZE;
use crate::error::{ErrorKind, Result};
use crate::{MetaData, ReadResults, RecordType, UpdatePolicy, WriteResults};
use csv::{QuoteStyle, ReaderBuilder, StringRecord, WriterBuilder};
use std::collections::BTreeSet;
use std::io::Write;
use time::format_description::FormatItem;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime};
use tome_catalog::Book;

const ID: &str = "_id";
const UUID: &str = "book_uuid";
const LAST_UPDATED: &str = "last_update_date";
const TITLE: &str = "title";
const ISBN: &str = "isbn";
const AUTHORS: &str = "author_details";
const SERIES: &str = "series_details";
const BOOKSHELVES: &str = "bookshelf";
const LIBRARY: &str = "library_uuid";
const FIELD_PREFIX: &str = "field:";

const COLUMNS: [&str; 9] = [ID, UUID, LAST_UPDATED, TITLE, ISBN, AUTHORS, SERIES, BOOKSHELVES, LIBRARY];
const REQUIRED: [&str; 2] = [UUID, TITLE];
const SEPARATOR: char = '|';

/// Older exports stored UTC timestamps without an offset.
const LEGACY_TIMESTAMP: &[FormatItem<'static>] = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

fn parse_timestamp(value: &str) -> Option<OffsetDateTime> {
    let value = value.trim();
    OffsetDateTime::parse(value, &Rfc3339)
        .ok()
        .or_else(|| PrimitiveDateTime::parse(value, LEGACY_TIMESTAMP).ok().map(PrimitiveDateTime::assume_utc))
}

fn split_list(value: &str) -> Vec<String> {
    value.split(SEPARATOR).map(str::trim).filter(|item| !item.is_empty()).map(str::to_string).collect()
}

fn optional(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|value| !value.is_empty()).map(str::to_string)
}

struct Columns {
    headers: StringRecord,
}

impl Columns {
    fn new(headers: StringRecord) -> Result<Self> {
        for required in REQUIRED {
            if !headers.iter().any(|header| header == required) {
                exn::bail!(ErrorKind::format(format!("CSV is missing the `{required}` column")));
            }
        }
        Ok(Self { headers })
    }

    fn get<'r>(&self, row: &'r StringRecord, column: &str) -> Option<&'r str> {
        let index = self.headers.iter().position(|header| header == column)?;
        row.get(index)
    }

    fn book(&self, row: &StringRecord) -> Book {
        let mut book = Book::new(self.get(row, UUID).unwrap_or_default().trim(), self.get(row, TITLE).unwrap_or_default());
        book.last_modified = self.get(row, LAST_UPDATED).and_then(parse_timestamp);
        book.isbn = optional(self.get(row, ISBN));
        book.authors = self.get(row, AUTHORS).map(split_list).unwrap_or_default();
        book.series = optional(self.get(row, SERIES));
        book.bookshelves = self.get(row, BOOKSHELVES).map(split_list).unwrap_or_default();
        book.library = optional(self.get(row, LIBRARY));
        for (header, value) in self.headers.iter().zip(row.iter()) {
            if let Some(key) = header.strip_prefix(FIELD_PREFIX)
                && !value.is_empty()
            {
                book.fields.insert(key.to_string(), value.to_string());
            }
        }
        book
    }
}

pub(crate) struct CsvRecordReader {
    allowed: BTreeSet<RecordType>,
    policy: UpdatePolicy,
}

impl CsvRecordReader {
    pub(crate) fn new(allowed: BTreeSet<RecordType>, policy: UpdatePolicy) -> Self {
        Self { allowed, policy }
    }
}

impl RecordReader for CsvRecordReader {
    #[tracing::instrument(level = "debug", skip_all, fields(entry = entry.name()))]
    fn read(&mut self, entry: &mut Entry<'_>, context: &ReadContext<'_>) -> Result<ReadResults> {
        let mut importer = Importer::new(context.catalog, &self.allowed, self.policy);
        if !importer.allows(RecordType::Books) {
            return Ok(importer.finish());
        }
        let mut reader = ReaderBuilder::new().buffer_capacity(BUFFER_SIZE).flexible(true).from_reader(entry.reader());
        let columns = Columns::new(reader.headers().map_err(ErrorKind::csv)?.clone())?;
        let mut row = StringRecord::new();
        let mut index = 0;
        loop {
            match reader.read_record(&mut row) {
                Ok(true) => {
                    let book = columns.book(&row);
                    importer.book(index, &book);
                    context.progress.advance(1, Some(&book.title));
                },
                Ok(false) => break,
                Err(err) if err.is_io_error() => return Err(ErrorKind::csv(err)),
                Err(err) => importer.failed(RecordType::Books, index, err),
            }
            index += 1;
        }
        Ok(importer.finish())
    }
}

pub(crate) struct CsvRecordWriter {
    since: Option<OffsetDateTime>,
}

impl CsvRecordWriter {
    pub(crate) fn new(since: Option<OffsetDateTime>) -> Self {
        Self { since }
    }
}

impl RecordWriter for CsvRecordWriter {
    fn write_metadata(&mut self, _out: &mut dyn Write, _metadata: &MetaData) -> Result<()> {
        exn::bail!(ErrorKind::format("the envelope cannot be written as CSV"))
    }

    #[tracing::instrument(level = "debug", skip(self, out, context))]
    fn write(&mut self, out: &mut dyn Write, record_type: RecordType, context: &WriteContext<'_>) -> Result<WriteResults> {
        if record_type != RecordType::Books {
            exn::bail!(ErrorKind::format(format!("no CSV encoding for {record_type} records")));
        }
        let books = context.catalog.books(self.since).map_err(ErrorKind::catalog)?;
        let fields: BTreeSet<&str> = books.iter().flat_map(|book| book.fields.keys().map(String::as_str)).collect();

        let mut writer = WriterBuilder::new().buffer_capacity(BUFFER_SIZE).quote_style(QuoteStyle::Always).from_writer(out);
        let headers = COLUMNS.iter().map(|column| column.to_string()).chain(fields.iter().map(|key| format!("{FIELD_PREFIX}{key}")));
        writer.write_record(headers).map_err(ErrorKind::csv)?;
        for (index, book) in books.iter().enumerate() {
            let modified = match book.last_modified {
                Some(at) => at.format(&Rfc3339).map_err(|e| ErrorKind::format(e.to_string()))?,
                None => String::new(),
            };
            let fixed = [
                (index + 1).to_string(),
                book.uuid.clone(),
                modified,
                book.title.clone(),
                book.isbn.clone().unwrap_or_default(),
                book.authors.join("|"),
                book.series.clone().unwrap_or_default(),
                book.bookshelves.join("|"),
                book.library.clone().unwrap_or_default(),
            ];
            let custom = fields.iter().map(|key| book.fields.get(*key).cloned().unwrap_or_default());
            writer.write_record(fixed.into_iter().chain(custom)).map_err(ErrorKind::csv)?;
            context.progress.advance(1, Some(&book.title));
        }
        writer.flush().map_err(ErrorKind::io)?;
        Ok(WriteResults { books: books.len() as u64, ..WriteResults::default() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::{NoProgress, ProgressReporter};
    use crate::{Counters, RecordEncoding};
    use std::io::Cursor;
    use time::macros::datetime;
    use tome_catalog::{Catalog, MemoryCatalog};

    fn read(csv: &str, catalog: &MemoryCatalog, policy: UpdatePolicy) -> Result<ReadResults> {
        let mut reader = Cursor::new(csv.as_bytes().to_vec());
        let mut entry = Entry::new("books.csv", RecordType::Books, RecordEncoding::Csv, None, &mut reader);
        let progress = ProgressReporter::new(&NoProgress);
        let context = ReadContext { catalog, progress: &progress };
        CsvRecordReader::new(BTreeSet::from([RecordType::Books]), policy).read(&mut entry, &context)
    }

    #[test]
    fn test_legacy_rows() {
        let csv = concat!(
            "\"_id\",\"book_uuid\",\"last_update_date\",\"title\",\"author_details\",\"bookshelf\"\n",
            "\"1\",\"a\",\"2020-02-02 10:00:00\",\"Dune\",\"Frank Herbert\",\"Sci-Fi|Favourites\"\n",
            "\"2\",\"b\",\"\",\"\",\"\",\"\"\n",
        );
        let catalog = MemoryCatalog::default();
        let results = read(csv, &catalog, UpdatePolicy::OnlyNewer).unwrap();
        assert_eq!(results.books, Counters { processed: 2, created: 1, failed: 1, ..Counters::default() });
        let book = catalog.book("a").unwrap().unwrap();
        assert_eq!(book.bookshelves, vec!["Sci-Fi", "Favourites"]);
        assert_eq!(book.last_modified, Some(datetime!(2020-02-02 10:00 UTC)));
    }

    #[test]
    fn test_missing_required_column() {
        let err = read("\"_id\",\"title\"\n\"1\",\"Dune\"\n", &MemoryCatalog::default(), UpdatePolicy::Skip).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Format(Some(_))));
    }

    #[test]
    fn test_write_then_read() {
        let source = MemoryCatalog::default().with_books([
            Book::new("a", "Dune, Messiah").by("Frank Herbert").on_shelf("Sci-Fi").modified_at(datetime!(2024-01-01 0:00 UTC)),
            Book::new("b", "Emma \"the novel\"").by("Jane Austen").by("Editor"),
        ]);
        let progress = ProgressReporter::new(&NoProgress);
        let context = WriteContext { catalog: &source, progress: &progress, subject: None };
        let mut out = Vec::new();
        let written = CsvRecordWriter::new(None).write(&mut out, RecordType::Books, &context).unwrap();
        assert_eq!(written.books, 2);
        assert!(out.starts_with(b"\"_id\","));

        let target = MemoryCatalog::default();
        let results = read(std::str::from_utf8(&out).unwrap(), &target, UpdatePolicy::Overwrite).unwrap();
        assert_eq!(results.books.created, 2);
        assert_eq!(target.books(None).unwrap(), source.books(None).unwrap());
    }
}
