//! Async façade over the blocking sessions.

use super::{ReaderSession, WriterSession};
use crate::error::{ErrorKind, Result};
use crate::progress::Progress;
use crate::{CancellationToken, MetaData, Outcome, ReadResults, WriteResults};
use async_stream::stream;
use futures::Stream;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedSender};
use tome_catalog::CatalogHandle;

/// Events emitted by [`restore`] and [`backup`].
///
/// Events follow a strict ordering:
/// 1. [`Started`](Self::Started), exactly once.
/// 2. [`MetaData`](Self::MetaData), at most once and only when restoring.
/// 3. [`Progress`](Self::Progress), zero or more times.
/// 4. [`Complete`](Self::Complete) or [`Cancelled`](Self::Cancelled),
///    exactly once.
///
/// An error terminates the stream early, in which case neither of the last
/// two is emitted.
#[derive(Debug)]
pub enum Event<T> {
    Started,
    MetaData(MetaData),
    Progress(Progress),
    Complete(T),
    Cancelled(T),
}

/// Dropping the stream before it finishes cancels whatever the worker is
/// doing, or is about to do.
struct CancelOnDrop(CancellationToken);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

/// Run `work` on the blocking pool and relay whatever it sends.
///
/// `work` gets a token owned by the stream. It is cancelled when the stream
/// is dropped, even if the worker has not opened a container yet. The
/// channel is unbounded so the worker never waits for the consumer.
fn relay<T, W>(work: W) -> impl Stream<Item = Result<Event<T>>>
where
    T: Send + 'static,
    W: FnOnce(&UnboundedSender<Event<T>>, CancellationToken) -> Result<Outcome<T>> + Send + 'static,
{
    stream!({
        let cancel = CancellationToken::new();
        let _abandon = CancelOnDrop(cancel.clone());
        yield Ok(Event::Started);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let task = tokio::task::spawn_blocking(move || work(&tx, cancel));
        while let Some(event) = rx.recv().await {
            yield Ok(event);
        }
        let last = match task.await {
            Ok(Ok(Outcome::Completed(results))) => Ok(Event::Complete(results)),
            Ok(Ok(Outcome::Cancelled(results))) => Ok(Event::Cancelled(results)),
            Ok(Err(err)) => Err(err),
            Err(err) => Err(exn::Exn::from(err).raise(ErrorKind::Io)),
        };
        yield last;
    })
}

/// Stream a restore of `session` into `catalog`.
///
/// The envelope is read first and reported as [`Event::MetaData`]; the full
/// read then opens the archive again.
pub fn restore(session: Arc<ReaderSession>, catalog: CatalogHandle) -> impl Stream<Item = Result<Event<ReadResults>>> {
    relay(move |events, cancel| {
        if let Some(metadata) = session.read_metadata()? {
            let _ = events.send(Event::MetaData(metadata));
        }
        let listener = |progress: &Progress| {
            let _ = events.send(Event::Progress(progress.clone()));
        };
        session.run_with(catalog.as_ref(), &listener, cancel)
    })
}

/// Stream a backup of `catalog` through `session`.
pub fn backup(session: Arc<WriterSession>, catalog: CatalogHandle) -> impl Stream<Item = Result<Event<WriteResults>>> {
    relay(move |events, cancel| {
        let listener = |progress: &Progress| {
            let _ = events.send(Event::Progress(progress.clone()));
        };
        session.run_with(catalog.as_ref(), &listener, cancel)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ContainerFormat, ExportOptions, ImportOptions, RecordType};
    use futures::StreamExt;
    use tome_catalog::{Book, Catalog, MemoryCatalog};
    use tome_storage::MemoryResource;

    #[tokio::test]
    async fn test_backup_then_restore() {
        let resource = MemoryResource::new("backup.zip");
        let source: CatalogHandle =
            Arc::new(MemoryCatalog::default().with_books([Book::new("u-1", "Dune"), Book::new("u-2", "Emma")]));
        let writer = WriterSession::new(Arc::new(resource.clone()), ContainerFormat::Zip, ExportOptions::new([RecordType::Books]))
            .unwrap();
        let events: Vec<_> = backup(Arc::new(writer), source).collect().await;
        assert!(matches!(events.first(), Some(Ok(Event::Started))));
        let Some(Ok(Event::Complete(results))) = events.last() else { panic!("backup did not complete") };
        assert_eq!(results.books, 2);

        let target = Arc::new(MemoryCatalog::default());
        let reader = ReaderSession::new(Arc::new(resource.clone()), ImportOptions::new([RecordType::Books]));
        let events: Vec<_> = restore(Arc::new(reader), target.clone()).collect().await;
        assert!(matches!(events.first(), Some(Ok(Event::Started))));
        assert!(matches!(events.get(1), Some(Ok(Event::MetaData(m))) if m.book_count() == Some(2)));
        assert!(events.iter().any(|event| matches!(event, Ok(Event::Progress(_)))));
        let Some(Ok(Event::Complete(results))) = events.last() else { panic!("restore did not complete") };
        assert_eq!(results.books.created, 2);
        assert_eq!(target.book("u-2").unwrap().unwrap().title, "Emma");
        assert_eq!(resource.open_handles(), 0);
    }

    #[tokio::test]
    async fn test_restore_error_ends_stream() {
        let resource = MemoryResource::with_bytes("notes.txt", b"nothing to see".to_vec());
        let reader = ReaderSession::new(Arc::new(resource), ImportOptions::default());
        let events: Vec<_> = restore(Arc::new(reader), Arc::new(MemoryCatalog::default())).collect().await;
        assert_eq!(events.len(), 2);
        assert!(matches!(events.last(), Some(Err(err)) if **err == ErrorKind::Format(None)));
    }
}
