//! Multi-mode tokenizer with first character dispatch.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod lexer;
pub mod pattern;
pub mod span;
pub mod token;

pub use config::{LexerConfig, PositionTracking};
pub use error::{LexerDefinitionError, LexicalError, LexicalErrorKind, UnknownMode};
pub use lexer::{LexResult, Lexer, LexerDefinition};
pub use span::{LineCol, Span};
pub use token::{CustomPattern, Group, Pattern, Token, TokenType, TokenTypeId, Vocabulary};
