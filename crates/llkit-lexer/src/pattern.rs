//! Compilation of token patterns and the static analysis the dispatch tables are built from.
//!
//! Regex patterns are parsed into `regex_syntax` HIR. Case insensitive literals and
//! classes are already expanded by the translator so the first characters of a pattern can
//! be read straight from the tree.

use std::sync::Arc;

use regex_syntax::hir::{Class, Hir, HirKind};

use crate::token::{MatchFn, Pattern};

#[derive(Clone)]
pub enum CompiledPattern {
    Literal(String),
    Regex(regex::Regex),
    Custom(Arc<MatchFn>),
}

impl CompiledPattern {
    /// Length in bytes of the match starting exactly at `offset`.
    pub fn match_at(&self, text: &str, offset: usize) -> Option<usize> {
        match self {
            CompiledPattern::Literal(literal) => {
                if text[offset..].starts_with(literal.as_str()) {
                    Some(literal.len())
                } else {
                    None
                }
            }
            CompiledPattern::Regex(regex) => regex.find(&text[offset..]).map(|m| m.end()),
            CompiledPattern::Custom(matcher) => {
                // lengths which don't end on a character boundary are not a match
                matcher(text, offset).filter(|&len| {
                    offset
                        .checked_add(len)
                        .is_some_and(|end| text.is_char_boundary(end))
                })
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FirstChars {
    /// Inclusive ranges.
    Ranges(Vec<(char, char)>),
    /// Could not be analyzed, the pattern must be tried everywhere.
    Any,
}

#[derive(Clone, Debug)]
pub struct Analysis {
    pub first: FirstChars,
    pub nullable: bool,
    pub line_breaks: bool,
}

#[derive(Debug)]
pub enum PatternError {
    Regex(String),
    /// Category-only pattern, nothing to compile.
    NotMatchable,
}

pub fn compile(
    pattern: &Pattern,
    terminators: &[char],
) -> Result<(CompiledPattern, Analysis), PatternError> {
    match pattern {
        Pattern::Literal(literal) => {
            let first = match literal.chars().next() {
                Some(c) => FirstChars::Ranges(vec![(c, c)]),
                None => FirstChars::Any,
            };
            let analysis = Analysis {
                first,
                nullable: literal.is_empty(),
                line_breaks: literal.contains(terminators),
            };
            Ok((CompiledPattern::Literal(literal.clone()), analysis))
        }
        Pattern::Regex(source) => {
            let hir = regex_syntax::parse(source).map_err(|e| PatternError::Regex(e.to_string()))?;
            let regex = regex::Regex::new(&format!(r"\A(?:{source})"))
                .map_err(|e| PatternError::Regex(e.to_string()))?;

            let mut ranges = Vec::new();
            let first = match first_chars(&hir, &mut ranges) {
                Some(_) => FirstChars::Ranges(ranges),
                None => FirstChars::Any,
            };
            let analysis = Analysis {
                first,
                nullable: hir.properties().minimum_len() == Some(0),
                line_breaks: can_contain(&hir, terminators),
            };
            Ok((CompiledPattern::Regex(regex), analysis))
        }
        Pattern::Custom(custom) => {
            let first = match &custom.start_chars {
                Some(chars) => FirstChars::Ranges(chars.iter().map(|&c| (c, c)).collect()),
                None => FirstChars::Any,
            };
            let analysis = Analysis {
                first,
                nullable: false,
                line_breaks: false,
            };
            Ok((CompiledPattern::Custom(custom.matcher.clone()), analysis))
        }
        Pattern::None => Err(PatternError::NotMatchable),
    }
}

/// Collects the characters which can start a match of `hir`, returns whether `hir` can
/// match the empty string or `None` if the pattern is outside what we can analyze.
fn first_chars(hir: &Hir, out: &mut Vec<(char, char)>) -> Option<bool> {
    match hir.kind() {
        HirKind::Empty | HirKind::Look(_) => Some(true),
        HirKind::Literal(literal) => {
            let c = first_utf8_char(&literal.0)?;
            out.push((c, c));
            Some(false)
        }
        HirKind::Class(Class::Unicode(class)) => {
            out.extend(class.ranges().iter().map(|r| (r.start(), r.end())));
            Some(false)
        }
        HirKind::Class(Class::Bytes(class)) => {
            for range in class.ranges() {
                // a byte above ascii is only a fragment of a character
                if !range.end().is_ascii() {
                    return None;
                }
                out.push((range.start() as char, range.end() as char));
            }
            Some(false)
        }
        HirKind::Repetition(repetition) => {
            let nullable = first_chars(&repetition.sub, out)?;
            Some(nullable || repetition.min == 0)
        }
        HirKind::Capture(capture) => first_chars(&capture.sub, out),
        HirKind::Concat(children) => {
            for child in children {
                if !first_chars(child, out)? {
                    return Some(false);
                }
            }
            Some(true)
        }
        HirKind::Alternation(children) => {
            let mut nullable = false;
            for child in children {
                nullable |= first_chars(child, out)?;
            }
            Some(nullable)
        }
    }
}

fn first_utf8_char(bytes: &[u8]) -> Option<char> {
    let len = bytes.len().min(4);
    for end in 1..=len {
        if let Ok(str) = std::str::from_utf8(&bytes[..end]) {
            return str.chars().next();
        }
    }
    None
}

fn can_contain(hir: &Hir, terminators: &[char]) -> bool {
    match hir.kind() {
        HirKind::Empty | HirKind::Look(_) => false,
        HirKind::Literal(literal) => String::from_utf8_lossy(&literal.0).contains(terminators),
        HirKind::Class(Class::Unicode(class)) => class
            .ranges()
            .iter()
            .any(|r| terminators.iter().any(|&t| r.start() <= t && t <= r.end())),
        HirKind::Class(Class::Bytes(class)) => class.ranges().iter().any(|r| {
            terminators
                .iter()
                .any(|&t| t.is_ascii() && r.start() <= t as u8 && t as u8 <= r.end())
        }),
        HirKind::Repetition(repetition) => can_contain(&repetition.sub, terminators),
        HirKind::Capture(capture) => can_contain(&capture.sub, terminators),
        HirKind::Concat(children) | HirKind::Alternation(children) => {
            children.iter().any(|c| can_contain(c, terminators))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyze(source: &str) -> Analysis {
        let Ok((_, analysis)) = compile(&Pattern::Regex(source.to_owned()), &['\n', '\r']) else {
            panic!("`{source}` failed to compile");
        };
        analysis
    }

    fn ranges(source: &str) -> Vec<(char, char)> {
        match analyze(source).first {
            FirstChars::Ranges(mut ranges) => {
                ranges.sort();
                ranges
            }
            FirstChars::Any => panic!("`{source}` was not analyzed"),
        }
    }

    #[test]
    fn test_first_chars() {
        assert_eq!(ranges("[a-z]+"), vec![('a', 'z')]);
        assert_eq!(ranges("if|else"), vec![('e', 'e'), ('i', 'i')]);
        assert_eq!(ranges("a?b"), vec![('a', 'a'), ('b', 'b')]);
        assert_eq!(ranges("(?:-)?[0-9]+"), vec![('-', '-'), ('0', '9')]);
        assert_eq!(ranges("(?i)x"), vec![('X', 'X'), ('x', 'x')]);
        assert_eq!(ranges("é+"), vec![('é', 'é')]);
    }

    #[test]
    fn test_nullable_and_line_breaks() {
        assert!(analyze("a*").nullable);
        assert!(!analyze("a+").nullable);
        assert!(analyze(r"\s+").line_breaks);
        assert!(analyze("/\\*[^*]*\\*/").line_breaks);
        assert!(!analyze("[a-z]+").line_breaks);
    }

    #[test]
    fn test_match_at() {
        let (regex, _) = compile(&Pattern::Regex("[0-9]+".into()), &[]).unwrap();
        assert_eq!(regex.match_at("ab123c", 2), Some(3));
        assert_eq!(regex.match_at("ab123c", 0), None);

        let (literal, _) = compile(&Pattern::Literal("==".into()), &[]).unwrap();
        assert_eq!(literal.match_at("a==b", 1), Some(2));
        assert_eq!(literal.match_at("a=b", 1), None);
    }
}
