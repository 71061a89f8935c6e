//! Calibre-style library databases. Read only.
//!
//! SQLite needs a real file, so the resource is spooled to a temporary file
//! first. The whole database is a single record; cancellation is checked
//! before it starts.

use super::{Close, ContainerReader, ReadRequest};
use crate::codec::Importer;
use crate::consts::BUFFER_SIZE;
use crate::error::{Error, ErrorKind, Result};
use crate::metadata::{ARCHIVER_VERSION_KEY, BOOK_COUNT_KEY, DATABASE_VERSION_KEY};
use crate::progress::ProgressReporter;
use crate::{MetaData, Outcome, ReadResults, RecordType};
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection};
use sqlx::{Connection, FromRow};
use std::collections::BTreeMap;
use std::io::{BufWriter, Read, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use time::format_description::FormatItem;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::OffsetDateTime;
use tokio::runtime::Runtime;
use tome_catalog::Book;
use tome_storage::ResourceHandle;

const SQLITE_MAGIC: &[u8; 16] = b"SQLite format 3\0";
/// Databases are not archives; they are read as the oldest archive version.
const DATABASE_ARCHIVER_VERSION: i64 = 1;
const LAST_MODIFIED: &[FormatItem<'static>] = format_description!(
    "[year]-[month]-[day] [hour]:[minute]:[second][optional [.[subsecond]]][offset_hour sign:mandatory]:[offset_minute]"
);

#[track_caller]
fn database(err: sqlx::Error) -> Error {
    let kind = match &err {
        sqlx::Error::Io(io) => ErrorKind::from_io(io),
        _ => ErrorKind::format(format!("unreadable database: {err}")),
    };
    exn::Exn::from(err).raise(kind)
}

#[derive(FromRow)]
struct BookRow {
    id: i64,
    uuid: Option<String>,
    title: String,
    isbn: Option<String>,
    last_modified: Option<String>,
}

#[derive(FromRow)]
struct NameRow {
    book: i64,
    name: String,
}

impl BookRow {
    fn into_book(self, authors: &mut BTreeMap<i64, Vec<String>>, series: &mut BTreeMap<i64, Vec<String>>) -> Book {
        let mut book = Book::new(self.uuid.unwrap_or_default(), self.title);
        book.isbn = self.isbn.filter(|isbn| !isbn.trim().is_empty());
        book.last_modified = self.last_modified.as_deref().and_then(|value| {
            OffsetDateTime::parse(value, LAST_MODIFIED).or_else(|_| OffsetDateTime::parse(value, &Rfc3339)).ok()
        });
        book.authors = authors.remove(&self.id).unwrap_or_default();
        book.series = series.remove(&self.id).and_then(|names| names.into_iter().next());
        book
    }
}

fn group(rows: Vec<NameRow>) -> BTreeMap<i64, Vec<String>> {
    let mut map: BTreeMap<i64, Vec<String>> = BTreeMap::new();
    for row in rows {
        map.entry(row.book).or_default().push(row.name);
    }
    map
}

async fn connect(path: &Path) -> sqlx::Result<SqliteConnection> {
    let options = SqliteConnectOptions::new().filename(path).read_only(true);
    SqliteConnection::connect_with(&options).await
}

async fn load_metadata(path: &Path) -> sqlx::Result<MetaData> {
    let mut conn = connect(path).await?;
    let user_version: i64 = sqlx::query_scalar("PRAGMA user_version").fetch_one(&mut conn).await?;
    let books: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM books").fetch_one(&mut conn).await?;
    conn.close().await?;
    let mut metadata = MetaData::new();
    metadata.insert(ARCHIVER_VERSION_KEY, DATABASE_ARCHIVER_VERSION);
    metadata.insert(DATABASE_VERSION_KEY, user_version);
    if books > 0 {
        metadata.insert(BOOK_COUNT_KEY, books);
    }
    Ok(metadata)
}

async fn load_books(path: &Path) -> sqlx::Result<Vec<Book>> {
    let mut conn = connect(path).await?;
    let rows: Vec<BookRow> = sqlx::query_as(include_str!("../../queries/calibre_books.sql")).fetch_all(&mut conn).await?;
    let authors: Vec<NameRow> =
        sqlx::query_as(include_str!("../../queries/calibre_authors.sql")).fetch_all(&mut conn).await?;
    let series: Vec<NameRow> = sqlx::query_as(include_str!("../../queries/calibre_series.sql")).fetch_all(&mut conn).await?;
    conn.close().await?;
    let (mut authors, mut series) = (group(authors), group(series));
    Ok(rows.into_iter().map(|row| row.into_book(&mut authors, &mut series)).collect())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Unopened,
    Validated,
    Closed,
}

pub(crate) struct SqliteReader {
    resource: ResourceHandle,
    state: State,
    spool: Option<NamedTempFile>,
    runtime: Option<Runtime>,
    metadata: Option<MetaData>,
}

impl SqliteReader {
    pub(crate) fn new(resource: ResourceHandle) -> Self {
        Self { resource, state: State::Unopened, spool: None, runtime: None, metadata: None }
    }

    fn ensure_open(&mut self) -> Result<()> {
        match self.state {
            State::Unopened => self.validate(),
            State::Validated => Ok(()),
            State::Closed => exn::bail!(ErrorKind::Contract("container is already closed")),
        }
    }

    /// Copy the resource into a temporary file, checking the header on the way.
    fn spool(&self) -> Result<NamedTempFile> {
        let mut reader = self.resource.reader().map_err(ErrorKind::storage)?;
        let mut header = [0u8; 16];
        reader.read_exact(&mut header).map_err(|_| ErrorKind::Format(None))?;
        if &header != SQLITE_MAGIC {
            exn::bail!(ErrorKind::Format(None));
        }
        let spool = NamedTempFile::new().map_err(ErrorKind::io)?;
        let mut out = BufWriter::with_capacity(BUFFER_SIZE, spool.as_file());
        out.write_all(&header).map_err(ErrorKind::io)?;
        std::io::copy(&mut reader, &mut out).map_err(ErrorKind::io)?;
        out.flush().map_err(ErrorKind::io)?;
        drop(out);
        Ok(spool)
    }

    fn parts(&self) -> Result<(&Runtime, &Path)> {
        match (&self.runtime, &self.spool) {
            (Some(runtime), Some(spool)) => Ok((runtime, spool.path())),
            _ => exn::bail!(ErrorKind::Contract("database is not open")),
        }
    }
}

impl Close for SqliteReader {
    fn close(&mut self) -> Result<()> {
        self.state = State::Closed;
        self.runtime = None;
        if let Some(spool) = self.spool.take() {
            spool.close().map_err(ErrorKind::io)?;
        }
        Ok(())
    }
}

impl ContainerReader for SqliteReader {
    #[tracing::instrument(level = "debug", skip_all, fields(resource = self.resource.display_name()))]
    fn validate(&mut self) -> Result<()> {
        match self.state {
            State::Unopened => {},
            State::Validated => return Ok(()),
            State::Closed => exn::bail!(ErrorKind::Contract("container is already closed")),
        }
        let spool = self.spool()?;
        let runtime =
            tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(ErrorKind::io)?;
        let metadata = runtime.block_on(load_metadata(spool.path())).map_err(database)?;
        tracing::debug!(books = metadata.book_count(), "opened library database");
        self.spool = Some(spool);
        self.runtime = Some(runtime);
        self.metadata = Some(metadata);
        self.state = State::Validated;
        Ok(())
    }

    fn read_metadata(&mut self) -> Result<Option<MetaData>> {
        self.ensure_open()?;
        Ok(self.metadata.clone())
    }

    fn read(&mut self, request: &ReadRequest<'_>) -> Result<Outcome<ReadResults>> {
        self.ensure_open()?;
        if request.cancel.is_cancelled() {
            return Ok(Outcome::Cancelled(ReadResults::default()));
        }
        let allowed = RecordType::expand(request.options.record_types());
        let mut importer = Importer::new(request.catalog, &allowed, request.options.update_policy());
        if !importer.allows(RecordType::Books) {
            return Ok(Outcome::Completed(importer.finish()));
        }
        let (runtime, path) = self.parts()?;
        let books = runtime.block_on(load_books(path)).map_err(database)?;
        let progress = ProgressReporter::new(request.progress);
        progress.grow_max(books.len() as u64);
        for (index, book) in books.iter().enumerate() {
            importer.book(index, book);
            progress.advance(1, Some(&book.title));
        }
        Ok(Outcome::Completed(importer.finish()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancellationToken;
    use crate::options::ImportOptions;
    use crate::progress::NoProgress;
    use crate::{Counters, UpdatePolicy};
    use std::sync::Arc;
    use time::macros::datetime;
    use tome_catalog::{Catalog, MemoryCatalog};
    use tome_storage::MemoryResource;

    fn library() -> MemoryResource {
        let file = NamedTempFile::new().unwrap();
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        runtime.block_on(async {
            let options = SqliteConnectOptions::new().filename(file.path()).create_if_missing(true);
            let mut conn = SqliteConnection::connect_with(&options).await.unwrap();
            sqlx::query(include_str!("../../tests/fixtures/calibre_schema.sql")).execute(&mut conn).await.unwrap();
            sqlx::query(
                r#"
                    PRAGMA user_version = 26;
                    INSERT INTO books (id, title, isbn, uuid, last_modified) VALUES
                        (1, 'Dune', '9780441013593', 'u-1', '2023-04-05 06:07:08.123456+00:00'),
                        (2, 'Emma', '', 'u-2', '2022-01-01 00:00:00+00:00'),
                        (3, 'Nameless', '', NULL, '2022-01-01 00:00:00+00:00');
                    INSERT INTO authors (id, name) VALUES (1, 'Frank Herbert'), (2, 'Jane Austen');
                    INSERT INTO books_authors_link (book, author) VALUES (1, 1), (2, 2);
                    INSERT INTO series (id, name) VALUES (1, 'Dune Chronicles');
                    INSERT INTO books_series_link (book, series) VALUES (1, 1);
                "#,
            )
            .execute(&mut conn)
            .await
            .unwrap();
            conn.close().await.unwrap();
        });
        MemoryResource::with_bytes("metadata.db", std::fs::read(file.path()).unwrap())
    }

    #[test]
    fn test_metadata_is_synthesised() {
        let mut reader = SqliteReader::new(Arc::new(library()));
        let metadata = reader.read_metadata().unwrap().unwrap();
        assert_eq!(metadata.validate().unwrap(), 1);
        assert_eq!(metadata.database_version(), Some(26));
        assert_eq!(metadata.book_count(), Some(3));
        reader.close().unwrap();
        reader.close().unwrap();
    }

    #[test]
    fn test_books_are_imported() {
        let resource = library();
        let mut reader = SqliteReader::new(Arc::new(resource.clone()));
        let catalog = MemoryCatalog::default();
        let options = ImportOptions::new([RecordType::Books]).with_policy(UpdatePolicy::Overwrite);
        let cancel = CancellationToken::new();
        let request = ReadRequest { catalog: &catalog, options: &options, progress: &NoProgress, cancel: &cancel };
        let results = reader.read(&request).unwrap().into_results();
        reader.close().unwrap();
        assert_eq!(results.books, Counters { processed: 3, created: 2, failed: 1, ..Counters::default() });
        let dune = catalog.book("u-1").unwrap().unwrap();
        assert_eq!(dune.authors, vec!["Frank Herbert"]);
        assert_eq!(dune.series.as_deref(), Some("Dune Chronicles"));
        assert_eq!(dune.last_modified, Some(datetime!(2023-04-05 06:07:08.123456 UTC)));
        assert_eq!(catalog.book("u-2").unwrap().unwrap().isbn, None);
        assert_eq!(resource.open_handles(), 0);
    }

    #[test]
    fn test_not_a_database() {
        let resource = MemoryResource::with_bytes("metadata.db", b"SQLite format 2\0 and then some".to_vec());
        let err = SqliteReader::new(Arc::new(resource)).validate().unwrap_err();
        assert_eq!(*err, ErrorKind::Format(None));
    }
}
