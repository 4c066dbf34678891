//! In-flight work accounting for crawl termination
//!
//! Every page accepted into the parser queue is counted until it reaches one
//! of its terminal states: dropped as a duplicate, rejected with an error,
//! or parsed and stored. When the count returns to zero the crawl has
//! drained and the coordinator can shut the pumps down.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// Shared counter of pages still somewhere in the pipeline
#[derive(Debug, Clone, Default)]
pub struct WorkTracker {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    pending: AtomicUsize,
    idle: Notify,
}

impl WorkTracker {
    pub fn new() -> Self {
        WorkTracker::default()
    }

    /// Records a page entering the pipeline
    pub fn begin(&self) {
        self.inner.pending.fetch_add(1, Ordering::AcqRel);
    }

    /// Records a page reaching a terminal state
    pub fn finish(&self) {
        let previous = self.inner.pending.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(previous != 0, "finish without matching begin");

        if previous == 1 {
            self.inner.idle.notify_waiters();
        }
    }

    /// Number of pages currently in flight
    pub fn pending(&self) -> usize {
        self.inner.pending.load(Ordering::Acquire)
    }

    /// Resolves once no pages remain in flight
    ///
    /// Callers must queue the first page before waiting, otherwise the
    /// tracker is already idle and this returns immediately.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.pending() == 0 {
                return;
            }

            notified.await;
        }
    }
}
