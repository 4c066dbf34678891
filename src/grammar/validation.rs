use crate::grammar::types::{Entity, Grammar};
use crate::grammar::{GrammarError, GrammarResult};
use scraper::Selector;
use std::collections::HashSet;

/// Validates a parsed grammar before the crawl starts
///
/// Checks that the grammar is non-empty, that entity names are unique within
/// their kind, and that every selector compiles. Violations here are fatal
/// configuration errors; anything that can only be judged against a fetched
/// document (such as a route naming an undeclared page) is reported at parse
/// time instead.
pub fn validate(grammar: &Grammar) -> GrammarResult<()> {
    if grammar.entities.is_empty() {
        return Err(GrammarError::Empty);
    }

    let mut seen = HashSet::new();
    for entity in &grammar.entities {
        if entity.name.is_empty() {
            return Err(GrammarError::EmptyEntityName { kind: entity.kind });
        }

        if !seen.insert((entity.kind, entity.name.clone())) {
            return Err(GrammarError::DuplicateEntity {
                kind: entity.kind,
                name: entity.name.clone(),
            });
        }

        validate_routes(entity)?;
    }

    Ok(())
}

fn validate_routes(entity: &Entity) -> GrammarResult<()> {
    for route in &entity.routes {
        if route.selector.is_empty() {
            return Err(GrammarError::EmptySelector {
                kind: entity.kind,
                entity: entity.name.clone(),
            });
        }

        if let Err(e) = Selector::parse(&route.selector) {
            return Err(GrammarError::InvalidSelector {
                kind: entity.kind,
                entity: entity.name.clone(),
                selector: route.selector.clone(),
                message: e.to_string(),
            });
        }
    }

    Ok(())
}
