//! Grammar module for the crawl description language
//!
//! A grammar file declares how a site is traversed: named `page` and `block`
//! entities, each with an ordered list of routes pairing a CSS selector with
//! a target kind and name.
//!
//! # Example
//!
//! ```no_run
//! use morsel::grammar::load_grammar;
//! use std::path::Path;
//!
//! let grammar = load_grammar(Path::new("site.grammar")).unwrap();
//! println!("{} entities", grammar.entities.len());
//! ```

mod parser;
mod types;
mod validation;

pub use parser::{load_grammar, parse_grammar};
pub use types::{Entity, EntityKind, Grammar, Route, RouteKind};
pub use validation::validate;

use thiserror::Error;

/// Errors raised while loading, parsing or validating a grammar
#[derive(Debug, Error)]
pub enum GrammarError {
    #[error("Failed to read grammar file: {0}")]
    Io(#[from] std::io::Error),

    #[error("line {line}: unexpected character '{found}'")]
    UnexpectedChar { line: usize, found: char },

    #[error("line {line}: unterminated string literal")]
    UnterminatedString { line: usize },

    #[error("line {line}: expected {expected}, found {found}")]
    Unexpected {
        line: usize,
        expected: &'static str,
        found: String,
    },

    #[error("line {line}: unknown entity kind '{kind}' (expected \"page\" or \"block\")")]
    UnknownEntityKind { line: usize, kind: String },

    #[error(
        "line {line}: unknown route target kind '{kind}' (expected \"page\", \"block\" or \"file\")"
    )]
    UnknownRouteKind { line: usize, kind: String },

    #[error("duplicate {kind} \"{name}\"")]
    DuplicateEntity { kind: EntityKind, name: String },

    #[error("invalid selector \"{selector}\" in {kind} \"{entity}\": {message}")]
    InvalidSelector {
        kind: EntityKind,
        entity: String,
        selector: String,
        message: String,
    },

    #[error("{kind} entity with an empty name")]
    EmptyEntityName { kind: EntityKind },

    #[error("empty selector in {kind} \"{entity}\"")]
    EmptySelector { kind: EntityKind, entity: String },

    #[error("grammar defines no entities")]
    Empty,
}

/// Result type for grammar operations
pub type GrammarResult<T> = std::result::Result<T, GrammarError>;
