use serde::Serialize;

use crate::span::{LineCol, Span};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LexicalErrorKind {
    UnexpectedCharacters,
    EmptyModeStack,
    /// Offsets are 32 bit, longer inputs are rejected as a whole.
    InputTooLarge,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("{message}")]
pub struct LexicalError {
    pub kind: LexicalErrorKind,
    pub span: Span,
    pub start: Option<LineCol>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LexerDefinitionError {
    #[error("Token type `{token}` has an invalid pattern: {message}")]
    InvalidPattern { token: String, message: String },
    #[error("Token type `{token}` can match the empty string")]
    EmptyMatch { token: String },
    #[error("Token type `{token}` has no pattern and cannot be matched")]
    NotMatchable { token: String },
    #[error("Token type `{token}` pushes unknown lexer mode `{target}`")]
    UnknownPushMode { token: String, target: String },
    #[error("Unknown default lexer mode `{mode}`")]
    UnknownDefaultMode { mode: String },
    #[error("Duplicate token type name `{token}`")]
    DuplicateName { token: String },
    #[error("Cannot compute the first characters of token type `{token}`")]
    Unoptimized { token: String },
    #[error("Token type `{token}` has a longer alternative `{alternative}` which is not part of lexer mode `{mode}`")]
    LongerAlternativeNotInMode {
        token: String,
        alternative: String,
        mode: String,
    },
    #[error("Token type `{token}` refers to a category or longer alternative which is not registered in its vocabulary")]
    UnknownTokenType { token: String },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown lexer mode `{0}`")]
pub struct UnknownMode(pub String);
