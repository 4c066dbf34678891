//! Cache-or-fetch dispatcher
//!
//! The logist sits between the parser and the fetcher/storage pair. A fetch
//! request first consults the cache and republishes a hit without touching
//! the network; a miss goes to the fetcher, whose deliveries the driver task
//! persists on first observation before forwarding. Storing a parsed page is
//! guarded by the content fingerprint, so an unchanged page never hits disk
//! twice.

use crate::crawler::{FailedPage, FetcherStreams};
use crate::page::Page;
use crate::storage::Storage;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const DELIVERY_CAPACITY: usize = 1;

/// Output streams handed to the parser
pub struct LogistStreams {
    pub delivery: mpsc::Receiver<Page>,
    /// Pass-through of the fetcher's error stream
    pub errors: mpsc::Receiver<FailedPage>,
}

/// Deduplicating front for fetch and store
pub struct Logist<S> {
    storage: Arc<S>,
    fetcher_queue: mpsc::Sender<Page>,
    fetcher_delivery: mpsc::Receiver<Page>,
    delivery_tx: mpsc::Sender<Page>,
}

/// Cloneable handle for issuing fetch and store requests
pub struct LogistHandle<S> {
    storage: Arc<S>,
    fetcher_queue: mpsc::Sender<Page>,
    delivery_tx: mpsc::Sender<Page>,
}

impl<S> Clone for LogistHandle<S> {
    fn clone(&self) -> Self {
        LogistHandle {
            storage: Arc::clone(&self.storage),
            fetcher_queue: self.fetcher_queue.clone(),
            delivery_tx: self.delivery_tx.clone(),
        }
    }
}

impl<S: Storage + 'static> Logist<S> {
    /// Creates a logist in front of the given fetcher channels
    pub fn new(
        storage: Arc<S>,
        fetcher_queue: mpsc::Sender<Page>,
        fetcher_streams: FetcherStreams,
    ) -> (Self, LogistStreams) {
        let (delivery_tx, delivery_rx) = mpsc::channel(DELIVERY_CAPACITY);

        let logist = Logist {
            storage,
            fetcher_queue,
            fetcher_delivery: fetcher_streams.delivery,
            delivery_tx,
        };

        let streams = LogistStreams {
            delivery: delivery_rx,
            errors: fetcher_streams.errors,
        };

        (logist, streams)
    }

    pub fn handle(&self) -> LogistHandle<S> {
        LogistHandle {
            storage: Arc::clone(&self.storage),
            fetcher_queue: self.fetcher_queue.clone(),
            delivery_tx: self.delivery_tx.clone(),
        }
    }

    /// Spawns the driver task consuming fetcher deliveries
    ///
    /// Every freshly fetched page is persisted on first observation, then
    /// republished on the logist's own delivery stream.
    pub fn start(mut self) -> JoinHandle<()> {
        tokio::spawn(async move {
            tracing::info!("logist: starting");

            while let Some(page) = self.fetcher_delivery.recv().await {
                tracing::debug!("logist: saving {} to storage", page.url);
                self.storage.put(&page);

                if self.delivery_tx.send(page).await.is_err() {
                    tracing::warn!("logist: delivery stream closed, stopping");
                    return;
                }
            }
        })
    }
}

impl<S: Storage> LogistHandle<S> {
    /// Ensures a page's body is delivered: from the cache if present,
    /// otherwise through the fetcher
    pub async fn fetch(&self, page: Page) {
        if let Some(saved) = self.storage.get(&page.url) {
            tracing::debug!("logist: {} from storage", page.url);
            if self.delivery_tx.send(saved).await.is_err() {
                tracing::warn!("logist: delivery stream closed");
            }
            return;
        }

        tracing::debug!("logist: {} to fetcher", page.url);
        if self.fetcher_queue.send(page).await.is_err() {
            tracing::warn!("logist: fetcher queue closed");
        }
    }

    /// Persists a parsed page when its content fingerprint changed
    pub fn store(&self, mut page: Page) {
        match page.refresh_hash() {
            Ok(true) => {
                tracing::debug!("logist: {} changed, storing", page.url);
                self.storage.put(&page);
            }
            Ok(false) => {
                tracing::debug!("logist: skip saving {} (no changes)", page.url);
            }
            Err(e) => {
                tracing::error!("logist: cannot fingerprint {}: {}", page.url, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::FileStorage;
    use std::time::Duration;
    use tempfile::TempDir;

    fn create_test_logist() -> (TempDir, Arc<FileStorage>, Logist<FileStorage>, LogistStreams) {
        let dir = TempDir::new().unwrap();
        let storage = Arc::new(FileStorage::new(dir.path()));

        let (fetcher_queue, _queue_rx) = mpsc::channel(1);
        let (_delivery_tx, delivery_rx) = mpsc::channel(1);
        let (_errors_tx, errors_rx) = mpsc::channel(1);
        let streams = FetcherStreams {
            delivery: delivery_rx,
            errors: errors_rx,
        };

        let (logist, logist_streams) = Logist::new(Arc::clone(&storage), fetcher_queue, streams);
        (dir, storage, logist, logist_streams)
    }

    #[tokio::test]
    async fn test_fetch_cache_hit_skips_fetcher() {
        let (_dir, storage, logist, mut streams) = create_test_logist();

        let mut cached = Page::new("post", "/posts/1");
        cached.body = b"cached body".to_vec();
        storage.put(&cached);

        let handle = logist.handle();
        let fetch = tokio::spawn(async move { handle.fetch(Page::new("post", "/posts/1")).await });

        let delivered = tokio::time::timeout(Duration::from_secs(1), streams.delivery.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(delivered.body, b"cached body");
        fetch.await.unwrap();
    }

    #[tokio::test]
    async fn test_fetch_cache_miss_goes_to_fetcher() {
        let dir = TempDir::new().unwrap();
        let storage = Arc::new(FileStorage::new(dir.path()));

        let (fetcher_queue, mut queue_rx) = mpsc::channel(1);
        let (_delivery_tx, delivery_rx) = mpsc::channel(1);
        let (_errors_tx, errors_rx) = mpsc::channel(1);
        let (logist, _streams) = Logist::new(
            storage,
            fetcher_queue,
            FetcherStreams {
                delivery: delivery_rx,
                errors: errors_rx,
            },
        );

        logist.handle().fetch(Page::new("post", "/posts/1")).await;

        let queued = queue_rx.try_recv().unwrap();
        assert_eq!(queued.url, "/posts/1");
    }

    #[tokio::test]
    async fn test_driver_persists_then_republishes() {
        let dir = TempDir::new().unwrap();
        let storage = Arc::new(FileStorage::new(dir.path()));

        let (fetcher_queue, _queue_rx) = mpsc::channel(1);
        let (delivery_tx, delivery_rx) = mpsc::channel(1);
        let (_errors_tx, errors_rx) = mpsc::channel(1);
        let (logist, mut streams) = Logist::new(
            Arc::clone(&storage),
            fetcher_queue,
            FetcherStreams {
                delivery: delivery_rx,
                errors: errors_rx,
            },
        );

        let driver = logist.start();

        let mut fetched = Page::new("post", "/posts/1");
        fetched.body = b"fresh".to_vec();
        delivery_tx.send(fetched).await.unwrap();

        let republished = tokio::time::timeout(Duration::from_secs(1), streams.delivery.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(republished.url, "/posts/1");
        assert_eq!(storage.get("/posts/1").unwrap().body, b"fresh");

        drop(delivery_tx);
        driver.await.unwrap();
    }

    #[test]
    fn test_store_skips_unchanged_page() {
        let (_dir, storage, logist, _streams) = create_test_logist();
        let handle = logist.handle();

        let mut page = Page::new("post", "/posts/1");
        page.body = b"body".to_vec();
        handle.store(page);

        // A second store of the identical content must not rewrite the entry
        let stored = storage.get("/posts/1").unwrap();
        assert!(stored.hash.is_some());

        let hash_before = stored.hash.clone();
        handle.store(stored);

        assert_eq!(storage.get("/posts/1").unwrap().hash, hash_before);
    }

    #[test]
    fn test_store_rewrites_changed_page() {
        let (_dir, storage, logist, _streams) = create_test_logist();
        let handle = logist.handle();

        let mut page = Page::new("post", "/posts/1");
        page.body = b"one".to_vec();
        handle.store(page);

        let mut changed = storage.get("/posts/1").unwrap();
        changed.body = b"two".to_vec();
        handle.store(changed);

        assert_eq!(storage.get("/posts/1").unwrap().body, b"two");
    }
}
