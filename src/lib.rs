//! Morsel: a declarative web-crawling and extraction engine
//!
//! Given a starting URL and a grammar describing how pages, blocks and
//! routes relate, morsel fetches a site transitively, extracts structured
//! fields with CSS selectors, caches every visited resource by content
//! hash, and can later materialize the cached files onto disk following a
//! path-template rule.
//!
//! # Architecture
//!
//! - `grammar`: the crawl description language (entities and routes)
//! - `page`: the page record, extraction tree and content fingerprint
//! - `crawler`: the concurrent fetch/parse/store pipeline
//! - `storage`: the content-addressed page cache
//! - `export`: template-driven materialization from cache to filesystem

pub mod crawler;
pub mod export;
pub mod grammar;
pub mod page;
pub mod storage;

use thiserror::Error;

/// Main error type for morsel operations
#[derive(Debug, Error)]
pub enum MorselError {
    #[error("Grammar error: {0}")]
    Grammar(#[from] grammar::GrammarError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] crawler::FetchError),

    #[error("Parse error: {0}")]
    Parse(#[from] crawler::ParseError),

    #[error("Page record error: {0}")]
    Page(#[from] page::PageError),

    #[error("Export error: {0}")]
    Export(#[from] export::ExportError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for morsel operations
pub type Result<T> = std::result::Result<T, MorselError>;

// Re-export commonly used types
pub use crawler::{run_crawl, CrawlOptions};
pub use grammar::{load_grammar, Grammar};
pub use page::{Block, Page, Value};
pub use storage::{FileStorage, Storage};
