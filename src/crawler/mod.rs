//! Crawler module: the concurrent fetch/parse/store pipeline
//!
//! The pipeline is a closed feedback loop of independent tasks communicating
//! over typed bounded channels:
//!
//! - the [`Fetcher`] performs rate-limited HTTP retrieval;
//! - the [`Logist`] fronts the fetcher with the page cache;
//! - the [`Parser`] extracts field trees and discovers new work;
//! - the coordinator wires them together and waits for the loop to drain.
//!
//! Every URL is fetched at most once per run; parsing may re-enter
//! recursively through sub-blocks.

mod coordinator;
mod fetcher;
mod logist;
mod parser;
mod tracker;

pub use coordinator::{crawl_with_storage, run_crawl, CrawlOptions};
pub use fetcher::{FetchError, Fetcher, FetcherStreams};
pub use logist::{Logist, LogistHandle, LogistStreams};
pub use parser::{ParseError, Parser, ParserHandle};
pub use tracker::WorkTracker;

use crate::page::Page;
use crate::MorselError;

/// A page that left the pipeline with an error
///
/// Failure streams carry the page together with its error instead of
/// annotating the page record itself, so persisted pages never contain
/// transport state.
#[derive(Debug)]
pub struct FailedPage {
    pub page: Page,
    pub error: MorselError,
}

impl FailedPage {
    pub fn new(page: Page, error: impl Into<MorselError>) -> Self {
        FailedPage {
            page,
            error: error.into(),
        }
    }
}
