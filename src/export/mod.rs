//! Export module: from page cache to files on disk
//!
//! A path rule such as `out/{album:title}/{track:title}.{track:ext}` is
//! compiled into a list of steps, then replayed against every page in
//! storage. Token steps branch into child pages and append extracted field
//! values to the path; when the steps are exhausted the current page's body
//! is written to the accumulated path.

mod exporter;
mod rule;

pub use exporter::Exporter;
pub use rule::{compile_rule, Step};

use thiserror::Error;

/// Errors raised while compiling a rule or materializing a branch
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("malformed rule token \"{0}\": tokens must be in the form \"entity:field\"")]
    MalformedToken(String),

    #[error("missing field \"{field}\" for page \"{page}\"")]
    MissingField { field: String, page: String },

    #[error("field \"{0}\" holds a nested block, which cannot become a path segment")]
    NestedBlock(String),

    #[error("page \"{0}\" is not a downloaded file")]
    NotAFile(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for export operations
pub type ExportResult<T> = std::result::Result<T, ExportError>;
