use std::{collections::HashMap, fmt::Debug, sync::Arc};

use cranelift_entity::{entity_impl, PrimaryMap, SecondaryMap};
use serde::{Serialize, Serializer};

use crate::span::{LineCol, Span};

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct TokenTypeId(u32);

entity_impl! { TokenTypeId }

impl TokenTypeId {
    /// Always registered first by [`Vocabulary::new`].
    pub const EOF: TokenTypeId = TokenTypeId(0);

    pub fn name(self, vocabulary: &Vocabulary) -> &str {
        &vocabulary.get(self).name
    }
}

impl Serialize for TokenTypeId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u32(self.0)
    }
}

/// `(text, offset) -> matched length`
pub type MatchFn = dyn Fn(&str, usize) -> Option<usize> + Send + Sync;

#[derive(Clone)]
pub struct CustomPattern {
    pub(crate) matcher: Arc<MatchFn>,
    pub(crate) start_chars: Option<Vec<char>>,
}

impl CustomPattern {
    pub fn new(matcher: impl Fn(&str, usize) -> Option<usize> + Send + Sync + 'static) -> Self {
        Self {
            matcher: Arc::new(matcher),
            start_chars: None,
        }
    }
    /// Without this hint the pattern is a candidate at every position.
    pub fn with_start_chars(mut self, chars: impl IntoIterator<Item = char>) -> Self {
        self.start_chars = Some(chars.into_iter().collect());
        self
    }
}

impl Debug for CustomPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustomPattern")
            .field("start_chars", &self.start_chars)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Debug)]
pub enum Pattern {
    Literal(String),
    Regex(String),
    Custom(CustomPattern),
    /// Category-only types never match input by themselves.
    None,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Group {
    #[default]
    Default,
    Skip,
    Named(String),
}

#[derive(Clone, Debug)]
pub struct TokenType {
    pub(crate) name: String,
    pub(crate) pattern: Pattern,
    pub(crate) group: Group,
    pub(crate) categories: Vec<TokenTypeId>,
    pub(crate) push_mode: Option<String>,
    pub(crate) pop_mode: bool,
    pub(crate) longer_alternatives: Vec<TokenTypeId>,
    pub(crate) line_breaks: Option<bool>,
}

impl TokenType {
    pub fn new(name: impl Into<String>, pattern: Pattern) -> TokenType {
        TokenType {
            name: name.into(),
            pattern,
            group: Group::Default,
            categories: Vec::new(),
            push_mode: None,
            pop_mode: false,
            longer_alternatives: Vec::new(),
            line_breaks: None,
        }
    }
    pub fn literal(name: impl Into<String>, literal: impl Into<String>) -> TokenType {
        Self::new(name, Pattern::Literal(literal.into()))
    }
    pub fn regex(name: impl Into<String>, regex: impl Into<String>) -> TokenType {
        Self::new(name, Pattern::Regex(regex.into()))
    }
    pub fn category(name: impl Into<String>) -> TokenType {
        Self::new(name, Pattern::None)
    }
    pub fn group(mut self, group: Group) -> Self {
        self.group = group;
        self
    }
    pub fn skip(self) -> Self {
        self.group(Group::Skip)
    }
    pub fn in_category(mut self, category: TokenTypeId) -> Self {
        self.categories.push(category);
        self
    }
    pub fn push_mode(mut self, mode: impl Into<String>) -> Self {
        self.push_mode = Some(mode.into());
        self
    }
    pub fn pop_mode(mut self) -> Self {
        self.pop_mode = true;
        self
    }
    pub fn longer_alternative(mut self, alternative: TokenTypeId) -> Self {
        self.longer_alternatives.push(alternative);
        self
    }
    pub fn line_breaks(mut self, value: bool) -> Self {
        self.line_breaks = Some(value);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }
}

/// Registry of token types shared by the lexer and the parser.
///
/// Categories have to be registered before the types which reference them, so the
/// category relation cannot contain cycles.
pub struct Vocabulary {
    types: PrimaryMap<TokenTypeId, TokenType>,
    // transitive categories of every type, including the type itself, sorted
    is_a: SecondaryMap<TokenTypeId, Vec<TokenTypeId>>,
    // every other type which matches the key when it is used as a category
    subtypes: SecondaryMap<TokenTypeId, Vec<TokenTypeId>>,
    by_name: HashMap<String, TokenTypeId>,
    duplicates: Vec<TokenTypeId>,
    unknown_references: Vec<TokenTypeId>,
}

impl Vocabulary {
    pub fn new() -> Vocabulary {
        let mut this = Vocabulary {
            types: PrimaryMap::new(),
            is_a: SecondaryMap::new(),
            subtypes: SecondaryMap::new(),
            by_name: HashMap::new(),
            duplicates: Vec::new(),
            unknown_references: Vec::new(),
        };
        let eof = this.define(TokenType::new("EOF", Pattern::None));
        debug_assert_eq!(eof, TokenTypeId::EOF);
        this
    }

    /// Registers a token type. Duplicate names and references to types of another
    /// vocabulary are reported when a lexer is built.
    pub fn define(&mut self, mut token: TokenType) -> TokenTypeId {
        let references = token.categories.len() + token.longer_alternatives.len();
        token.categories.retain(|&category| self.types.is_valid(category));
        token
            .longer_alternatives
            .retain(|&alternative| self.types.is_valid(alternative));
        let unknown_reference =
            token.categories.len() + token.longer_alternatives.len() != references;

        let mut is_a = Vec::new();
        for &category in &token.categories {
            is_a.extend_from_slice(&self.is_a[category]);
        }

        let name = token.name.clone();
        let handle = self.types.push(token);

        is_a.push(handle);
        is_a.sort_unstable();
        is_a.dedup();

        for &category in &is_a {
            if category != handle {
                self.subtypes[category].push(handle);
            }
        }
        self.is_a[handle] = is_a;

        if unknown_reference {
            self.unknown_references.push(handle);
        }
        if self.by_name.contains_key(&name) {
            self.duplicates.push(handle);
        } else {
            self.by_name.insert(name, handle);
        }

        handle
    }

    #[track_caller]
    pub fn get(&self, handle: TokenTypeId) -> &TokenType {
        &self.types[handle]
    }

    pub fn lookup(&self, name: &str) -> Option<TokenTypeId> {
        self.by_name.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn iter(&self) -> cranelift_entity::Iter<'_, TokenTypeId, TokenType> {
        self.types.iter()
    }

    /// Whether a token of type `actual` satisfies an expectation of `expected`.
    pub fn matches(&self, actual: TokenTypeId, expected: TokenTypeId) -> bool {
        actual == expected || self.is_a[actual].binary_search(&expected).is_ok()
    }

    pub fn subtypes(&self, category: TokenTypeId) -> &[TokenTypeId] {
        &self.subtypes[category]
    }

    pub(crate) fn duplicates(&self) -> &[TokenTypeId] {
        &self.duplicates
    }

    pub(crate) fn unknown_references(&self) -> &[TokenTypeId] {
        &self.unknown_references
    }
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct Token {
    pub kind: TokenTypeId,
    pub image: String,
    pub span: Span,
    /// Position of the first character.
    pub start: Option<LineCol>,
    /// Position of the last character.
    pub end: Option<LineCol>,
    /// Fabricated by the parser during error recovery.
    pub inserted: bool,
}

impl Token {
    pub fn eof(offset: u32) -> Token {
        Token {
            kind: TokenTypeId::EOF,
            image: String::new(),
            span: Span::at(offset),
            start: None,
            end: None,
            inserted: false,
        }
    }

    /// Virtual token of type `kind` standing in front of `before`.
    pub fn inserted(kind: TokenTypeId, before: &Token) -> Token {
        Token {
            kind,
            image: String::new(),
            span: Span::at(before.span.start()),
            start: before.start,
            end: before.start,
            inserted: true,
        }
    }

    pub fn is_eof(&self) -> bool {
        self.kind == TokenTypeId::EOF
    }
}

impl Debug for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}({:?} @ {})", self.kind, self.image, self.span)?;
        if self.inserted {
            write!(f, " inserted")?;
        }
        Ok(())
    }
}
