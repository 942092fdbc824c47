//! LL(k) parser runtime for grammars written as Rust closures.
//!
//! Rule bodies are recorded once into a grammar AST which is resolved, validated and
//! analyzed into lookahead decisions, then executed directly for every parse.

pub mod analysis;
pub mod check;
pub mod config;
pub mod cst;
pub mod dsl;
pub mod error;
pub mod gast;
pub mod grammar;
pub mod lookahead;
pub mod parser;
pub mod record;
pub mod recovery;
pub mod resolve;

pub use config::{NodeLocationTracking, ParserConfig};
pub use cst::{CstElement, CstNode, Location};
pub use dsl::{rule_body, Alt, Dsl, Interrupt, RuleBody, Step};
pub use error::{
    DefinitionError, DefinitionErrorKind, DefinitionErrors, ParseError, RecognitionError,
    RecognitionErrorKind,
};
pub use gast::{Production, ProductionKind, Rule, RuleHandle};
pub use grammar::{Grammar, GrammarDefinition};
pub use parser::{ParseContext, ParseOutput};
