//! Storage module for the persistent page cache
//!
//! The cache is content-addressed by URL: every fetched page is persisted
//! under a sharded path derived from the MD5 of its URL, and looked up the
//! same way on later runs. Storage failures never abort a crawl: a failed
//! write is logged and dropped, and an unreadable entry is reported as
//! absent so the URL is simply refetched.

mod files;

pub use files::FileStorage;

use crate::page::Page;

/// Trait for page cache backends
///
/// Implementations must be shareable across the pipeline tasks; writes are
/// serialized per key by the dedup guard upstream, so no two writers ever
/// race on the same URL within a run.
pub trait Storage: Send + Sync {
    /// Returns the cached page for a URL, or `None` when absent or unreadable
    fn get(&self, url: &str) -> Option<Page>;

    /// Persists a page, overwriting any previous entry for its URL
    ///
    /// A page with an empty URL is silently ignored. I/O failures are logged
    /// and swallowed.
    fn put(&self, page: &Page);

    /// Yields every persisted page once, in unspecified order
    fn iterate(&self) -> Box<dyn Iterator<Item = Page> + '_>;
}
