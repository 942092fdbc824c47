use std::collections::BTreeMap;

use llkit_lexer::{LineCol, Token};
use serde::Serialize;

use crate::config::NodeLocationTracking;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CstElement {
    Token(Token),
    Node(CstNode),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Location {
    pub start_offset: u32,
    pub end_offset: Option<u32>,
    pub start: Option<LineCol>,
    pub end: Option<LineCol>,
}

/// Concrete syntax tree node of a single rule invocation.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CstNode {
    pub name: String,
    /// Children grouped by label, each group in the order it was parsed.
    pub children: BTreeMap<String, Vec<CstElement>>,
    pub location: Option<Location>,
    /// Parts of this node were skipped or fabricated by error recovery.
    pub recovered: bool,
}

impl CstNode {
    pub fn new(name: impl Into<String>) -> CstNode {
        CstNode {
            name: name.into(),
            children: BTreeMap::new(),
            location: None,
            recovered: false,
        }
    }

    pub fn add(&mut self, label: &str, element: CstElement, tracking: NodeLocationTracking) {
        match &element {
            CstElement::Token(token) if !token.inserted => {
                let location = Location {
                    start_offset: token.span.start(),
                    end_offset: Some(token.span.end()),
                    start: token.start,
                    end: token.end,
                };
                self.extend_location(location, tracking);
            }
            CstElement::Node(node) => {
                if let Some(location) = node.location {
                    self.extend_location(location, tracking);
                }
            }
            CstElement::Token(_) => {}
        }

        match self.children.get_mut(label) {
            Some(group) => group.push(element),
            None => {
                self.children.insert(label.to_owned(), vec![element]);
            }
        }
    }

    fn extend_location(&mut self, added: Location, tracking: NodeLocationTracking) {
        let added = match tracking {
            NodeLocationTracking::None => return,
            NodeLocationTracking::Full => added,
            NodeLocationTracking::StartOnly => Location {
                end_offset: None,
                end: None,
                ..added
            },
            NodeLocationTracking::OffsetOnly => Location {
                start: None,
                end: None,
                ..added
            },
        };

        let location = self.location.get_or_insert(added);
        if added.start_offset < location.start_offset {
            location.start_offset = added.start_offset;
            location.start = added.start;
        }
        if added.end_offset > location.end_offset {
            location.end_offset = added.end_offset;
            location.end = added.end;
        }
    }

    pub fn get(&self, label: &str) -> &[CstElement] {
        self.children.get(label).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn tokens<'a>(&'a self, label: &str) -> impl Iterator<Item = &'a Token> + 'a {
        self.get(label).iter().filter_map(|e| match e {
            CstElement::Token(token) => Some(token),
            CstElement::Node(_) => None,
        })
    }

    pub fn nodes<'a>(&'a self, label: &str) -> impl Iterator<Item = &'a CstNode> + 'a {
        self.get(label).iter().filter_map(|e| match e {
            CstElement::Node(node) => Some(node),
            CstElement::Token(_) => None,
        })
    }

    /// Every token read from the input under this node in source order, tokens
    /// fabricated by recovery are left out.
    pub fn source_tokens(&self) -> Vec<&Token> {
        fn collect<'a>(node: &'a CstNode, out: &mut Vec<&'a Token>) {
            for element in node.children.values().flatten() {
                match element {
                    CstElement::Token(token) if !token.inserted => out.push(token),
                    CstElement::Token(_) => {}
                    CstElement::Node(node) => collect(node, out),
                }
            }
        }

        let mut out = Vec::new();
        collect(self, &mut out);
        out.sort_by_key(|t| t.span.start());
        out
    }
}

#[cfg(test)]
mod tests {
    use llkit_lexer::{Span, TokenTypeId};

    use super::*;

    fn token(start: u32, end: u32) -> Token {
        Token {
            kind: TokenTypeId::EOF,
            image: "x".repeat((end - start) as usize),
            span: Span::new(start, end),
            start: Some(LineCol {
                line: 1,
                column: start + 1,
            }),
            end: Some(LineCol { line: 1, column: end }),
            inserted: false,
        }
    }

    #[test]
    fn test_location_tracking() {
        let mut inner = CstNode::new("inner");
        inner.add("B", CstElement::Token(token(4, 6)), NodeLocationTracking::Full);

        let mut outer = CstNode::new("outer");
        outer.add("A", CstElement::Token(token(0, 2)), NodeLocationTracking::Full);
        outer.add("inner", CstElement::Node(inner), NodeLocationTracking::Full);
        outer.add("A", CstElement::Token(Token::inserted(TokenTypeId::EOF, &token(8, 9))), NodeLocationTracking::Full);

        let location = outer.location.unwrap();
        assert_eq!(location.start_offset, 0);
        assert_eq!(location.end_offset, Some(6));
        assert_eq!(location.end, Some(LineCol { line: 1, column: 6 }));
        assert_eq!(outer.tokens("A").count(), 2);
        assert_eq!(outer.nodes("inner").count(), 1);

        let starts = outer.source_tokens().iter().map(|t| t.span.start()).collect::<Vec<_>>();
        assert_eq!(starts, [0, 4]);
    }

    #[test]
    fn test_offset_only() {
        let mut node = CstNode::new("node");
        node.add("A", CstElement::Token(token(3, 5)), NodeLocationTracking::OffsetOnly);
        assert_eq!(
            node.location,
            Some(Location {
                start_offset: 3,
                end_offset: Some(5),
                start: None,
                end: None
            })
        );

        let mut node = CstNode::new("node");
        node.add("A", CstElement::Token(token(3, 5)), NodeLocationTracking::None);
        assert_eq!(node.location, None);
    }
}
