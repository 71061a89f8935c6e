//! Progress reporting from the worker to whoever is watching.

use std::sync::atomic::{AtomicU64, Ordering};

/// A snapshot of how far a session has got.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    pub position: u64,
    /// Best current estimate of the total. Only ever revised upward.
    pub max: u64,
    pub message: Option<String>,
}

/// Receives progress notifications on the worker thread.
///
/// Implementations must return quickly and must never block waiting for the
/// consumer. Any `Fn(&Progress)` closure is a listener; forward over an
/// unbounded channel to hop threads.
pub trait ProgressListener: Send + Sync {
    fn on_progress(&self, progress: &Progress);
}

impl<F> ProgressListener for F
where
    F: Fn(&Progress) + Send + Sync,
{
    fn on_progress(&self, progress: &Progress) {
        self(progress)
    }
}

/// A listener that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressListener for NoProgress {
    fn on_progress(&self, _progress: &Progress) {}
}

/// Keeps counters monotonic no matter how codecs report.
pub(crate) struct ProgressReporter<'a> {
    listener: &'a dyn ProgressListener,
    position: AtomicU64,
    max: AtomicU64,
}

impl<'a> ProgressReporter<'a> {
    pub(crate) fn new(listener: &'a dyn ProgressListener) -> Self {
        Self { listener, position: AtomicU64::new(0), max: AtomicU64::new(0) }
    }

    /// Raise the estimated total. A lower estimate is ignored.
    pub(crate) fn grow_max(&self, max: u64) {
        self.max.fetch_max(max, Ordering::SeqCst);
    }

    /// Advance by `step` and notify.
    pub(crate) fn advance(&self, step: u64, message: Option<&str>) {
        let position = self.position.fetch_add(step, Ordering::SeqCst) + step;
        // An estimate that turns out to be too small is stretched rather than
        // letting position overtake it.
        let max = self.max.fetch_max(position, Ordering::SeqCst).max(position);
        self.listener.on_progress(&Progress { position, max, message: message.map(str::to_string) });
    }

    pub(crate) fn position(&self) -> u64 {
        self.position.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_counters_never_decrease() {
        let seen = Mutex::new(Vec::new());
        let listener = |p: &Progress| seen.lock().unwrap().push((p.position, p.max));
        let reporter = ProgressReporter::new(&listener);
        reporter.grow_max(3);
        reporter.advance(1, None);
        reporter.grow_max(1);
        reporter.advance(1, Some("books"));
        reporter.advance(5, None);
        assert_eq!(reporter.position(), 7);
        assert_eq!(*seen.lock().unwrap(), vec![(1, 3), (2, 3), (7, 7)]);
    }
}
