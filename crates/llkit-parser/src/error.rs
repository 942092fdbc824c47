use std::cell::{Ref, RefCell};

use llkit_lexer::Token;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DefinitionErrorKind {
    UnresolvedReference,
    DuplicateRule,
    NameCollision,
    LeftRecursion,
    EmptyRepetition,
    EmptyAlternative,
    AmbiguousAlternatives,
    AmbiguousPrefix,
    TooManyAlternatives,
    DuplicateOccurrence,
    InvalidOccurrence,
}

impl DefinitionErrorKind {
    /// Errors which make the grammar unusable regardless of strict mode.
    pub fn is_fatal(self) -> bool {
        !matches!(
            self,
            DefinitionErrorKind::EmptyAlternative
                | DefinitionErrorKind::AmbiguousAlternatives
                | DefinitionErrorKind::AmbiguousPrefix
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("{message}")]
pub struct DefinitionError {
    pub kind: DefinitionErrorKind,
    pub rule: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Grammar definition has {} error(s)", .0.len())]
pub struct DefinitionErrors(pub Vec<DefinitionError>);

impl DefinitionErrors {
    pub fn iter(&self) -> std::slice::Iter<'_, DefinitionError> {
        self.0.iter()
    }
    pub fn has(&self, kind: DefinitionErrorKind) -> bool {
        self.0.iter().any(|e| e.kind == kind)
    }
}

#[derive(Default)]
pub struct ErrorAccumulator {
    errors: RefCell<Vec<DefinitionError>>,
}

impl ErrorAccumulator {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn error(&self, kind: DefinitionErrorKind, rule: &str, err: impl ToString) {
        self.errors.borrow_mut().push(DefinitionError {
            kind,
            rule: rule.to_owned(),
            message: err.to_string(),
        });
    }
    pub fn get(&self) -> Ref<Vec<DefinitionError>> {
        self.errors.borrow()
    }
    pub fn is_empty(&self) -> bool {
        self.errors.borrow().is_empty()
    }
    pub fn has_fatal(&self) -> bool {
        self.errors.borrow().iter().any(|e| e.kind.is_fatal())
    }
    pub fn finish(self) -> Vec<DefinitionError> {
        self.errors.into_inner()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RecognitionErrorKind {
    MismatchedToken,
    NoViableAlternative,
    EarlyExit,
    NotAllInputParsed,
}

#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
#[error("{message}")]
pub struct RecognitionError {
    pub kind: RecognitionErrorKind,
    pub message: String,
    /// The offending token.
    pub token: Token,
    pub previous_token: Option<Token>,
    /// Tokens skipped while recovering from this error.
    pub resynced_tokens: Vec<Token>,
    /// Rule names from the start rule to the rule which failed.
    pub rule_stack: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("Unknown start rule `{0}`")]
    UnknownRule(String),
}
