//! Crawl orchestration
//!
//! Wires storage, fetcher, logist and parser together, seeds the start
//! page, and waits for the pipeline to drain. The crawl is done when every
//! queued page has reached a terminal state: parsed and stored, rejected
//! with an error, or dropped as a duplicate.

use crate::crawler::{Fetcher, Logist, Parser};
use crate::grammar::Grammar;
use crate::page::Page;
use crate::storage::{FileStorage, Storage};
use crate::MorselError;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Options for one crawl run
#[derive(Debug, Clone)]
pub struct CrawlOptions {
    /// Absolute starting URL; its scheme and host become the base for
    /// relative link resolution
    pub start_url: String,

    /// Grammar entity the start page is parsed with
    pub entity: String,

    /// Delay between consecutive HTTP requests
    pub delay: Duration,

    /// Cache directory for fetched pages
    pub cache_dir: PathBuf,
}

/// Runs a crawl against the filesystem cache
///
/// # Arguments
///
/// * `grammar` - The validated crawl grammar
/// * `options` - Start URL, entity name, delay and cache location
///
/// # Returns
///
/// * `Ok(())` - The crawl drained and shut down cleanly
/// * `Err(MorselError)` - The pipeline could not be constructed
pub async fn run_crawl(grammar: Grammar, options: CrawlOptions) -> Result<(), MorselError> {
    let storage = Arc::new(FileStorage::new(&options.cache_dir));
    crawl_with_storage(grammar, options, storage).await
}

/// Runs a crawl against any storage backend
///
/// Split out from [`run_crawl`] so tests and embedders can supply their own
/// cache implementation.
pub async fn crawl_with_storage<S: Storage + 'static>(
    grammar: Grammar,
    options: CrawlOptions,
    storage: Arc<S>,
) -> Result<(), MorselError> {
    let (fetcher, fetcher_streams) = Fetcher::new(&options.start_url, options.delay)?;
    let fetcher_queue = fetcher.queue();

    let (logist, logist_streams) = Logist::new(storage, fetcher_queue, fetcher_streams);
    let logist_handle = logist.handle();

    let parser = Parser::new(&grammar, logist_handle);
    let handle = parser.handle();
    let tracker = parser.tracker();

    let mut tasks = vec![fetcher.start(), logist.start()];
    tasks.extend(parser.start(logist_streams));

    tracing::info!(
        "crawling {} as \"{}\"",
        options.start_url,
        options.entity
    );
    handle
        .queue(Page::new(&options.entity, &options.start_url))
        .await;

    tracker.wait_idle().await;
    tracing::info!("crawl complete: no pages left in flight");

    for task in &tasks {
        task.abort();
    }

    Ok(())
}
