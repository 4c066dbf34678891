use std::fmt;

/// A parsed crawl grammar: the ordered list of declared entities
#[derive(Debug, Clone, PartialEq)]
pub struct Grammar {
    pub entities: Vec<Entity>,
}

/// The kind of a grammar entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    /// A fetchable document with its own routes
    Page,
    /// A reusable extraction subtree applied within a page
    Block,
}

/// The target kind of a route
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteKind {
    /// Matched URLs become new pages to fetch and parse
    Page,
    /// Matches are extracted in place, recursively if a block entity exists
    Block,
    /// Matched URLs become binary downloads
    File,
}

/// A named entity: `page "album" { ... }` or `block "track" { ... }`
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub kind: EntityKind,
    pub name: String,
    pub routes: Vec<Route>,
}

/// One extraction rule: `"ul.tracks a" -> page "track"`
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    /// CSS selector applied to the current DOM subtree
    pub selector: String,
    pub kind: RouteKind,
    /// Entity name (for `page`/`block` targets) and field name in the tree
    pub target: String,
}

impl Grammar {
    /// Iterates entities of the given kind
    pub fn entities_of(&self, kind: EntityKind) -> impl Iterator<Item = &Entity> {
        self.entities.iter().filter(move |e| e.kind == kind)
    }
}

impl EntityKind {
    pub fn parse(ident: &str) -> Option<Self> {
        match ident {
            "page" => Some(EntityKind::Page),
            "block" => Some(EntityKind::Block),
            _ => None,
        }
    }
}

impl RouteKind {
    pub fn parse(ident: &str) -> Option<Self> {
        match ident {
            "page" => Some(RouteKind::Page),
            "block" => Some(RouteKind::Block),
            "file" => Some(RouteKind::File),
            _ => None,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Page => write!(f, "page"),
            EntityKind::Block => write!(f, "block"),
        }
    }
}

impl fmt::Display for RouteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteKind::Page => write!(f, "page"),
            RouteKind::Block => write!(f, "block"),
            RouteKind::File => write!(f, "file"),
        }
    }
}
