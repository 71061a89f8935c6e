//! Sessions: one container open at a time, closed on every exit path.
//!
//! A session owns the resource and the options for one kind of operation.
//! Each [`run`](ReaderSession::run) opens a fresh container, and concurrent
//! runs on the same session queue up behind each other.

mod reader;
mod stream;
mod writer;

pub use self::reader::ReaderSession;
pub use self::stream::{Event, backup, restore};
pub use self::writer::WriterSession;
use crate::cancel::CancellationToken;
use crate::container::Close;
use crate::error::Result;
use std::sync::{Mutex, MutexGuard, PoisonError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The cancellation handle of whichever container is currently open.
///
/// Opening and closing a container both happen under this lock, so a
/// concurrent [`cancel`](Self::cancel) either reaches a live container or
/// finds nothing at all.
#[derive(Debug, Default)]
struct LiveHandle(Mutex<Option<CancellationToken>>);

impl LiveHandle {
    fn cancel(&self) -> bool {
        match lock(&self.0).as_ref() {
            Some(token) => {
                token.cancel();
                true
            },
            None => false,
        }
    }
}

/// An open container. Dropping it closes the container if nobody did.
struct Scope<'a, C: Close + ?Sized> {
    container: Box<C>,
    live: &'a LiveHandle,
    token: CancellationToken,
    closed: bool,
}

impl<'a, C: Close + ?Sized> Scope<'a, C> {
    /// Register a freshly opened container under `token`. `open` runs under
    /// the lock. A token cancelled before this stops the container at its
    /// first entry.
    fn open(live: &'a LiveHandle, token: CancellationToken, open: impl FnOnce() -> Result<Box<C>>) -> Result<Self> {
        let mut slot = lock(&live.0);
        let container = open()?;
        *slot = Some(token.clone());
        Ok(Self { container, live, token, closed: false })
    }

    fn container(&mut self) -> &mut C {
        &mut self.container
    }

    fn token(&self) -> &CancellationToken {
        &self.token
    }

    fn release(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let mut slot = lock(&self.live.0);
        slot.take();
        self.container.close()
    }

    /// Close now and report any failure to do so.
    fn close(mut self) -> Result<()> {
        self.release()
    }
}

impl<C: Close + ?Sized> Drop for Scope<'_, C> {
    fn drop(&mut self) {
        if let Err(err) = self.release() {
            let reason = &*err;
            tracing::warn!(%reason, "failed to close container");
        }
    }
}
