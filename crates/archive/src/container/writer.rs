//! The shared write loop for entry-based containers.

use super::{Close, ContainerWriter, WriteRequest};
use crate::codec::{CodecRegistry, WriteContext};
use crate::error::{ErrorKind, Result};
use crate::progress::ProgressReporter;
use crate::{MetaData, Outcome, RecordEncoding, RecordType, WriteResults};
use time::OffsetDateTime;

/// Where a concrete container puts its entries.
pub(crate) trait EntrySink: Send {
    /// Open the underlying stream for writing.
    fn open(&mut self) -> Result<()>;

    fn supports_covers(&self) -> bool;

    /// Whether entries of `encoding` can be stored.
    fn accepts(&self, _encoding: RecordEncoding) -> bool {
        true
    }

    /// Store one complete entry. Entries arrive in their final order.
    fn put(&mut self, name: &str, bytes: &[u8], modified: Option<OffsetDateTime>, compress: bool) -> Result<()>;

    /// Complete the container and flush it.
    fn finish(&mut self) -> Result<()>;

    /// Drop the underlying stream without completing the container.
    fn release(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Unopened,
    Writing,
    Failed,
    Closed,
}

fn entry_name(record_type: RecordType, encoding: RecordEncoding) -> String {
    format!("{}.{}", record_type.prefix(), encoding.extension())
}

/// A [`ContainerWriter`] over any [`EntrySink`].
///
/// Text records are encoded as JSON, books as whatever the options ask for.
/// Books are encoded before anything is stored so the envelope, which comes
/// first, can carry their count.
pub(crate) struct ArchiveWriter<S> {
    sink: S,
    state: State,
}

impl<S: EntrySink> ArchiveWriter<S> {
    pub(crate) fn new(sink: S) -> Self {
        Self { sink, state: State::Unopened }
    }

    fn write_entries(&mut self, request: &WriteRequest<'_>) -> Result<Outcome<WriteResults>> {
        let since = request.options.since();
        let mut types = RecordType::expand(request.options.record_types());
        types.retain(|ty| !matches!(ty, RecordType::MetaData | RecordType::Database | RecordType::AutoDetect));
        if !self.sink.supports_covers() && types.remove(&RecordType::Cover) {
            tracing::debug!("container cannot hold covers, leaving them out");
        }
        let order = RecordType::write_order(&types);

        let progress = ProgressReporter::new(request.progress);
        let context = WriteContext { catalog: request.catalog, progress: &progress, subject: None };
        let registry = CodecRegistry::new();
        let book_encoding = request.options.book_encoding();

        let mut books = Vec::new();
        let book_results = match types.contains(&RecordType::Books) {
            true => {
                if !self.sink.accepts(book_encoding) {
                    exn::bail!(ErrorKind::format(format!("this container cannot store {book_encoding} books")));
                }
                let mut writer = registry.new_writer(RecordType::Books, book_encoding, since)?;
                writer.write(&mut books, RecordType::Books, &context)?
            },
            false => WriteResults::default(),
        };
        let cover_names = match types.contains(&RecordType::Cover) {
            true => request.catalog.cover_names(since).map_err(ErrorKind::catalog)?,
            false => Vec::new(),
        };
        progress.grow_max(book_results.books + cover_names.len() as u64);
        let metadata = MetaData::for_export(request.options.app()).with_counts(book_results.books, cover_names.len() as u64);

        self.sink.open()?;
        self.state = State::Writing;
        let mut buf = Vec::new();
        registry.new_writer(RecordType::MetaData, RecordEncoding::Json, since)?.write_metadata(&mut buf, &metadata)?;
        self.sink.put(&entry_name(RecordType::MetaData, RecordEncoding::Json), &buf, None, true)?;

        let mut results = WriteResults::default();
        let mut book_results = Some(book_results);
        for record_type in order {
            if request.cancel.is_cancelled() {
                return Ok(Outcome::Cancelled(results));
            }
            match record_type {
                RecordType::Books => {
                    if let Some(written) = book_results.take().filter(|written| written.books > 0) {
                        self.sink.put(&entry_name(record_type, book_encoding), &books, None, true)?;
                        results += written;
                    }
                },
                RecordType::Cover => {
                    let mut covers = registry.new_writer(record_type, RecordEncoding::Image, since)?;
                    for name in &cover_names {
                        if request.cancel.is_cancelled() {
                            return Ok(Outcome::Cancelled(results));
                        }
                        buf.clear();
                        let context = WriteContext { subject: Some(name.as_str()), ..context };
                        let written = covers.write(&mut buf, record_type, &context)?;
                        if written.covers > 0 {
                            self.sink.put(name, &buf, covers.modified(), false)?;
                            results += written;
                        }
                    }
                },
                _ => {
                    buf.clear();
                    let mut text = registry.new_writer(record_type, RecordEncoding::Json, since)?;
                    let written = text.write(&mut buf, record_type, &context)?;
                    if written.count(record_type) > 0 {
                        self.sink.put(&entry_name(record_type, RecordEncoding::Json), &buf, None, true)?;
                        results += written;
                    }
                },
            }
        }
        Ok(Outcome::Completed(results))
    }
}

impl<S: EntrySink> Close for ArchiveWriter<S> {
    fn close(&mut self) -> Result<()> {
        let state = std::mem::replace(&mut self.state, State::Closed);
        match state {
            State::Writing => self.sink.finish(),
            State::Failed => {
                self.sink.release();
                Ok(())
            },
            State::Unopened | State::Closed => Ok(()),
        }
    }
}

impl<S: EntrySink> ContainerWriter for ArchiveWriter<S> {
    #[tracing::instrument(level = "debug", skip_all, fields(books, covers, cancelled))]
    fn write(&mut self, request: &WriteRequest<'_>) -> Result<Outcome<WriteResults>> {
        if self.state != State::Unopened {
            exn::bail!(ErrorKind::Contract("a container can only be written once"));
        }
        let outcome = self.write_entries(request).inspect_err(|_| self.state = State::Failed)?;
        let span = tracing::Span::current();
        span.record("books", outcome.results().books);
        span.record("covers", outcome.results().covers);
        span.record("cancelled", outcome.is_cancelled());
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancellationToken;
    use crate::options::ExportOptions;
    use crate::progress::{NoProgress, Progress};
    use tome_catalog::{Book, Bookshelf, Cover, MemoryCatalog};

    #[derive(Default)]
    struct VecSink {
        covers: bool,
        json_only: bool,
        opened: usize,
        entries: Vec<(String, Vec<u8>)>,
        finished: usize,
        released: usize,
    }

    impl EntrySink for VecSink {
        fn open(&mut self) -> Result<()> {
            self.opened += 1;
            Ok(())
        }

        fn supports_covers(&self) -> bool {
            self.covers
        }

        fn accepts(&self, encoding: RecordEncoding) -> bool {
            !self.json_only || encoding == RecordEncoding::Json
        }

        fn put(&mut self, name: &str, bytes: &[u8], _modified: Option<OffsetDateTime>, _compress: bool) -> Result<()> {
            self.entries.push((name.to_string(), bytes.to_vec()));
            Ok(())
        }

        fn finish(&mut self) -> Result<()> {
            self.finished += 1;
            Ok(())
        }

        fn release(&mut self) {
            self.released += 1;
        }
    }

    fn catalog() -> MemoryCatalog {
        MemoryCatalog::default()
            .with_bookshelves([Bookshelf::new("Sci-Fi")])
            .with_books([Book::new("a", "Dune").on_shelf("Sci-Fi"), Book::new("b", "Emma")])
            .with_covers([Cover::new("a.jpg", [0xFF, 0xD8, 0xFF])])
    }

    fn names(writer: &ArchiveWriter<VecSink>) -> Vec<&str> {
        writer.sink.entries.iter().map(|(name, _)| name.as_str()).collect()
    }

    #[test]
    fn test_entries_in_dependency_order() {
        let catalog = catalog();
        let mut writer = ArchiveWriter::new(VecSink { covers: true, ..VecSink::default() });
        let options = ExportOptions::new([RecordType::Books, RecordType::Cover]);
        let cancel = CancellationToken::new();
        let request = WriteRequest { catalog: &catalog, options: &options, progress: &NoProgress, cancel: &cancel };
        let results = writer.write(&request).unwrap().into_results();
        assert_eq!(names(&writer), vec!["info.json", "bookshelves.json", "books.json", "a.jpg"]);
        assert_eq!((results.books, results.covers, results.bookshelves), (2, 1, 1));

        let info: MetaData = serde_json::from_slice(&writer.sink.entries[0].1).unwrap();
        assert_eq!(info.book_count(), Some(2));
        assert_eq!(info.cover_count(), Some(1));
        writer.close().unwrap();
        writer.close().unwrap();
        assert_eq!(writer.sink.finished, 1);
    }

    #[test]
    fn test_covers_dropped_when_unsupported() {
        let catalog = catalog();
        let mut writer = ArchiveWriter::new(VecSink::default());
        let options = ExportOptions::default();
        let cancel = CancellationToken::new();
        let request = WriteRequest { catalog: &catalog, options: &options, progress: &NoProgress, cancel: &cancel };
        let results = writer.write(&request).unwrap().into_results();
        assert_eq!(results.covers, 0);
        assert!(!names(&writer).contains(&"a.jpg"));
    }

    #[test]
    fn test_cancel_from_progress() {
        let catalog = catalog();
        let mut writer = ArchiveWriter::new(VecSink { covers: true, ..VecSink::default() });
        let options = ExportOptions::new([RecordType::Books]);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let listener = move |_: &Progress| trigger.cancel();
        let request = WriteRequest { catalog: &catalog, options: &options, progress: &listener, cancel: &cancel };
        let outcome = writer.write(&request).unwrap();
        assert!(outcome.is_cancelled());
        assert_eq!(names(&writer), vec!["info.json"]);
        assert_eq!(outcome.results().books, 0);
    }

    #[test]
    fn test_books_as_csv() {
        let catalog = catalog();
        let mut writer = ArchiveWriter::new(VecSink::default());
        let options = ExportOptions::new([RecordType::Books]).with_book_encoding(RecordEncoding::Csv);
        let cancel = CancellationToken::new();
        let request = WriteRequest { catalog: &catalog, options: &options, progress: &NoProgress, cancel: &cancel };
        let results = writer.write(&request).unwrap().into_results();
        assert_eq!(results.books, 2);
        assert_eq!(names(&writer), vec!["info.json", "bookshelves.json", "books.csv"]);
        let csv = String::from_utf8(writer.sink.entries[2].1.clone()).unwrap();
        assert!(csv.starts_with("\"_id\",\"book_uuid\""));
        assert!(csv.contains("\"Dune\""));
    }

    #[test]
    fn test_unstorable_book_encoding_fails_before_open() {
        let catalog = catalog();
        let mut writer = ArchiveWriter::new(VecSink { json_only: true, ..VecSink::default() });
        let options = ExportOptions::new([RecordType::Books]).with_book_encoding(RecordEncoding::Csv);
        let cancel = CancellationToken::new();
        let request = WriteRequest { catalog: &catalog, options: &options, progress: &NoProgress, cancel: &cancel };
        let err = writer.write(&request).unwrap_err();
        assert_eq!(*err, ErrorKind::format("this container cannot store csv books"));
        assert_eq!(writer.sink.opened, 0);
        writer.close().unwrap();
        assert_eq!(writer.sink.finished, 0);
    }

    #[test]
    fn test_second_write_is_a_contract_violation() {
        let catalog = MemoryCatalog::default();
        let mut writer = ArchiveWriter::new(VecSink::default());
        let options = ExportOptions::default();
        let cancel = CancellationToken::new();
        let request = WriteRequest { catalog: &catalog, options: &options, progress: &NoProgress, cancel: &cancel };
        writer.write(&request).unwrap();
        assert!(matches!(*writer.write(&request).unwrap_err(), ErrorKind::Contract(_)));
    }
}
