//! Path-rule compilation
//!
//! A rule is literal text interspersed with `{entity:field}` tokens. Braces
//! that do not form a well-delimited token (unmatched, nested or empty) are
//! literal text; a delimited token without a `:` separator is a fatal error.

use crate::export::{ExportError, ExportResult};

/// One compiled element of a path rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Literal text appended to the path as-is
    Filler(String),

    /// `{name:field}` - branch into pages named `name` and append the
    /// value of `field`
    Token { name: String, field: String },
}

/// Compiles a path rule into its ordered steps
///
/// # Arguments
///
/// * `rule` - The rule text, e.g. `out/{album:title}/{track:file}`
///
/// # Returns
///
/// * `Ok(Vec<Step>)` - The compiled steps
/// * `Err(ExportError)` - A delimited token is not `name:field`
pub fn compile_rule(rule: &str) -> ExportResult<Vec<Step>> {
    let mut steps = Vec::new();
    let mut rest = rule;

    while !rest.is_empty() {
        match find_token(rest) {
            Some((start, end)) => {
                if start > 0 {
                    steps.push(Step::Filler(rest[..start].to_string()));
                }

                let inner = &rest[start + 1..end - 1];
                steps.push(parse_token(inner)?);

                rest = &rest[end..];
            }
            None => {
                steps.push(Step::Filler(rest.to_string()));
                rest = "";
            }
        }
    }

    Ok(steps)
}

/// Finds the next `{...}` span with non-empty, brace-free content
///
/// Returns the byte range including the braces.
fn find_token(text: &str) -> Option<(usize, usize)> {
    let mut search = 0;

    while let Some(open) = text[search..].find('{').map(|i| search + i) {
        match text[open + 1..].find(|c| c == '{' || c == '}') {
            Some(offset) => {
                let position = open + 1 + offset;
                if text.as_bytes()[position] == b'}' && position > open + 1 {
                    return Some((open, position + 1));
                }

                // nested '{' restarts the scan there; '{}' is literal
                search = if text.as_bytes()[position] == b'{' {
                    position
                } else {
                    position + 1
                };
            }
            None => return None,
        }
    }

    None
}

fn parse_token(inner: &str) -> ExportResult<Step> {
    let mut parts = inner.split(':');
    let name = parts.next().unwrap_or_default();
    let Some(field) = parts.next() else {
        return Err(ExportError::MalformedToken(inner.to_string()));
    };

    if name.is_empty() || field.is_empty() {
        return Err(ExportError::MalformedToken(inner.to_string()));
    }

    Ok(Step::Token {
        name: name.to_string(),
        field: field.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(name: &str, field: &str) -> Step {
        Step::Token {
            name: name.to_string(),
            field: field.to_string(),
        }
    }

    #[test]
    fn test_compile_mixed_rule() {
        let steps = compile_rule("out/{album:title}/{track:num} - {track:title}.{track:ext}")
            .unwrap();

        assert_eq!(
            steps,
            vec![
                Step::Filler("out/".to_string()),
                token("album", "title"),
                Step::Filler("/".to_string()),
                token("track", "num"),
                Step::Filler(" - ".to_string()),
                token("track", "title"),
                Step::Filler(".".to_string()),
                token("track", "ext"),
            ]
        );
    }

    #[test]
    fn test_compile_literal_only() {
        let steps = compile_rule("plain/path.txt").unwrap();
        assert_eq!(steps, vec![Step::Filler("plain/path.txt".to_string())]);
    }

    #[test]
    fn test_compile_token_only() {
        let steps = compile_rule("{page:file}").unwrap();
        assert_eq!(steps, vec![token("page", "file")]);
    }

    #[test]
    fn test_compile_empty_rule() {
        assert!(compile_rule("").unwrap().is_empty());
    }

    #[test]
    fn test_token_without_separator_is_fatal() {
        let err = compile_rule("out/{album}").unwrap_err();
        assert!(matches!(err, ExportError::MalformedToken(t) if t == "album"));
    }

    #[test]
    fn test_token_with_empty_half_is_fatal() {
        assert!(compile_rule("{:field}").is_err());
        assert!(compile_rule("{name:}").is_err());
    }

    #[test]
    fn test_extra_separators_keep_first_two_parts() {
        let steps = compile_rule("{a:b:c}").unwrap();
        assert_eq!(steps, vec![token("a", "b")]);
    }

    #[test]
    fn test_empty_braces_are_literal() {
        let steps = compile_rule("a{}b").unwrap();
        assert_eq!(steps, vec![Step::Filler("a{}b".to_string())]);
    }

    #[test]
    fn test_unclosed_brace_is_literal() {
        let steps = compile_rule("a{b").unwrap();
        assert_eq!(steps, vec![Step::Filler("a{b".to_string())]);
    }

    #[test]
    fn test_nested_open_brace_recovers() {
        let steps = compile_rule("x{{a:b}y").unwrap();
        assert_eq!(
            steps,
            vec![
                Step::Filler("x{".to_string()),
                token("a", "b"),
                Step::Filler("y".to_string()),
            ]
        );
    }
}
