//! Hand-rolled lexer and recursive-descent parser for grammar files
//!
//! The surface syntax is small enough that a dedicated parser dependency
//! would be heavier than the parser itself:
//!
//! ```text
//! Grammar  := { Entity }
//! Entity   := Ident String [ "{" { Route } "}" ]
//! Route    := String "->" Ident String
//! ```
//!
//! `//` starts a comment running to end of line. Strings are double-quoted
//! with `\"` and `\\` escapes.

use crate::grammar::types::{Entity, EntityKind, Grammar, Route, RouteKind};
use crate::grammar::validation::validate;
use crate::grammar::{GrammarError, GrammarResult};
use std::path::Path;

/// Loads, parses and validates a grammar file
///
/// # Arguments
///
/// * `path` - Path to the grammar file
///
/// # Returns
///
/// * `Ok(Grammar)` - Successfully loaded and validated grammar
/// * `Err(GrammarError)` - Failed to read, parse or validate
pub fn load_grammar(path: &Path) -> GrammarResult<Grammar> {
    let text = std::fs::read_to_string(path)?;
    let grammar = parse_grammar(&text)?;
    validate(&grammar)?;
    Ok(grammar)
}

/// Parses grammar text without validating it
pub fn parse_grammar(text: &str) -> GrammarResult<Grammar> {
    let tokens = tokenize(text)?;
    Parser::new(tokens).parse()
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    LBrace,
    RBrace,
    Arrow,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Ident(ident) => format!("'{ident}'"),
            Token::Str(text) => format!("\"{text}\""),
            Token::LBrace => "'{'".to_string(),
            Token::RBrace => "'}'".to_string(),
            Token::Arrow => "'->'".to_string(),
        }
    }
}

fn tokenize(text: &str) -> GrammarResult<Vec<(Token, usize)>> {
    let mut tokens = Vec::new();
    let mut chars = text.chars().peekable();
    let mut line = 1;

    while let Some(&c) = chars.peek() {
        match c {
            '\n' => {
                line += 1;
                chars.next();
            }
            c if c.is_whitespace() => {
                chars.next();
            }
            '{' => {
                tokens.push((Token::LBrace, line));
                chars.next();
            }
            '}' => {
                tokens.push((Token::RBrace, line));
                chars.next();
            }
            '-' => {
                chars.next();
                match chars.next() {
                    Some('>') => tokens.push((Token::Arrow, line)),
                    _ => return Err(GrammarError::UnexpectedChar { line, found: '-' }),
                }
            }
            '/' => {
                chars.next();
                match chars.next() {
                    // comment runs to end of line
                    Some('/') => {
                        for c in chars.by_ref() {
                            if c == '\n' {
                                line += 1;
                                break;
                            }
                        }
                    }
                    _ => return Err(GrammarError::UnexpectedChar { line, found: '/' }),
                }
            }
            '"' => {
                chars.next();
                let mut value = String::new();
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some('"') => value.push('"'),
                            Some('\\') => value.push('\\'),
                            Some(other) => {
                                value.push('\\');
                                value.push(other);
                            }
                            None => return Err(GrammarError::UnterminatedString { line }),
                        },
                        Some('\n') | None => {
                            return Err(GrammarError::UnterminatedString { line })
                        }
                        Some(other) => value.push(other),
                    }
                }
                tokens.push((Token::Str(value), line));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut ident = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_alphanumeric() || c == '_' {
                        ident.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push((Token::Ident(ident), line));
            }
            other => return Err(GrammarError::UnexpectedChar { line, found: other }),
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<(Token, usize)>,
    position: usize,
}

impl Parser {
    fn new(tokens: Vec<(Token, usize)>) -> Self {
        Parser {
            tokens,
            position: 0,
        }
    }

    fn parse(mut self) -> GrammarResult<Grammar> {
        let mut entities = Vec::new();
        while self.peek().is_some() {
            entities.push(self.parse_entity()?);
        }
        Ok(Grammar { entities })
    }

    fn parse_entity(&mut self) -> GrammarResult<Entity> {
        let (ident, line) = self.expect_ident("entity kind")?;
        let kind = EntityKind::parse(&ident)
            .ok_or(GrammarError::UnknownEntityKind { line, kind: ident })?;

        let (name, _) = self.expect_str("entity name")?;

        // The route list is optional; a bare `page "x"` declares a sink.
        let mut routes = Vec::new();
        if matches!(self.peek(), Some(Token::LBrace)) {
            self.advance();
            loop {
                match self.peek() {
                    Some(Token::RBrace) => {
                        self.advance();
                        break;
                    }
                    Some(Token::Str(_)) => routes.push(self.parse_route()?),
                    other => {
                        return Err(self.unexpected("a route selector or '}'", other));
                    }
                }
            }
        }

        Ok(Entity { kind, name, routes })
    }

    fn parse_route(&mut self) -> GrammarResult<Route> {
        let (selector, _) = self.expect_str("route selector")?;

        match self.peek() {
            Some(Token::Arrow) => self.advance(),
            other => return Err(self.unexpected("'->'", other)),
        }

        let (ident, line) = self.expect_ident("route target kind")?;
        let kind = RouteKind::parse(&ident)
            .ok_or(GrammarError::UnknownRouteKind { line, kind: ident })?;

        let (target, _) = self.expect_str("route target name")?;

        Ok(Route {
            selector,
            kind,
            target,
        })
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position).map(|(token, _)| token)
    }

    fn advance(&mut self) {
        self.position += 1;
    }

    fn current_line(&self) -> usize {
        self.tokens
            .get(self.position)
            .or_else(|| self.tokens.last())
            .map(|(_, line)| *line)
            .unwrap_or(1)
    }

    fn expect_ident(&mut self, expected: &'static str) -> GrammarResult<(String, usize)> {
        match self.tokens.get(self.position).cloned() {
            Some((Token::Ident(ident), line)) => {
                self.advance();
                Ok((ident, line))
            }
            other => Err(self.unexpected(expected, other.as_ref().map(|(t, _)| t))),
        }
    }

    fn expect_str(&mut self, expected: &'static str) -> GrammarResult<(String, usize)> {
        match self.tokens.get(self.position).cloned() {
            Some((Token::Str(text), line)) => {
                self.advance();
                Ok((text, line))
            }
            other => Err(self.unexpected(expected, other.as_ref().map(|(t, _)| t))),
        }
    }

    fn unexpected(&self, expected: &'static str, found: Option<&Token>) -> GrammarError {
        GrammarError::Unexpected {
            line: self.current_line(),
            expected,
            found: found
                .map(Token::describe)
                .unwrap_or_else(|| "end of input".to_string()),
        }
    }
}
