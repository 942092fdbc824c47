//! The interface rule bodies are written against.
//!
//! The same body runs twice: once against [`crate::record::GrammarBuilder`] which records
//! the grammar structure, and once per invocation against [`crate::parser::ParseContext`].

use std::sync::Arc;

use llkit_lexer::{Token, TokenTypeId};

/// A recognition error was recorded, unwind to the closest point which can recover.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interrupt {
    pub(crate) error: usize,
}

pub type Step<T> = Result<T, Interrupt>;

pub type Body<'a, R> = &'a mut dyn FnMut(&mut dyn Dsl<R>) -> Step<()>;

pub type RuleBody<R> = Arc<dyn Fn(&mut dyn Dsl<R>) -> Step<R> + Send + Sync>;

pub fn rule_body<R>(
    body: impl Fn(&mut dyn Dsl<R>) -> Step<R> + Send + Sync + 'static,
) -> RuleBody<R> {
    Arc::new(body)
}

pub struct Alt<'a, R> {
    pub(crate) body: &'a mut dyn FnMut(&mut dyn Dsl<R>) -> Step<R>,
    pub(crate) gate: Option<&'a dyn Fn(&mut dyn Dsl<R>) -> bool>,
    pub(crate) ignore_ambiguities: bool,
}

impl<'a, R> Alt<'a, R> {
    pub fn new(body: &'a mut dyn FnMut(&mut dyn Dsl<R>) -> Step<R>) -> Self {
        Self {
            body,
            gate: None,
            ignore_ambiguities: false,
        }
    }
    /// The alternative is only considered when `gate` returns true.
    pub fn gate(mut self, gate: &'a dyn Fn(&mut dyn Dsl<R>) -> bool) -> Self {
        self.gate = Some(gate);
        self
    }
    pub fn ignore_ambiguities(mut self) -> Self {
        self.ignore_ambiguities = true;
        self
    }
}

/// Grammar combinators.
///
/// Every method takes an occurrence index which distinguishes multiple uses of the
/// same method with the same argument within one rule.
pub trait Dsl<R> {
    fn is_recording(&self) -> bool;
    /// Token `distance` positions ahead, starting at 1. Past the end this is EOF.
    fn la(&self, distance: usize) -> &Token;

    fn consume_labeled(
        &mut self,
        occurrence: u32,
        token: TokenTypeId,
        label: Option<&str>,
    ) -> Step<Token>;
    fn subrule_labeled(&mut self, occurrence: u32, rule: &str, label: Option<&str>) -> Step<R>;

    fn option(&mut self, occurrence: u32, body: Body<'_, R>) -> Step<bool>;
    fn many(&mut self, occurrence: u32, body: Body<'_, R>) -> Step<()>;
    fn at_least_one(&mut self, occurrence: u32, body: Body<'_, R>) -> Step<()>;
    fn many_sep(&mut self, occurrence: u32, separator: TokenTypeId, body: Body<'_, R>)
        -> Step<()>;
    fn at_least_one_sep(
        &mut self,
        occurrence: u32,
        separator: TokenTypeId,
        body: Body<'_, R>,
    ) -> Step<()>;
    fn or(&mut self, occurrence: u32, alternatives: &mut [Alt<'_, R>]) -> Step<R>;

    /// Tries to parse `rule` at the current position without consuming input or
    /// reporting errors.
    fn backtrack(&mut self, rule: &str) -> bool;

    fn consume(&mut self, occurrence: u32, token: TokenTypeId) -> Step<Token> {
        self.consume_labeled(occurrence, token, None)
    }
    fn consume_as(&mut self, occurrence: u32, token: TokenTypeId, label: &str) -> Step<Token> {
        self.consume_labeled(occurrence, token, Some(label))
    }
    fn subrule(&mut self, occurrence: u32, rule: &str) -> Step<R> {
        self.subrule_labeled(occurrence, rule, None)
    }
    fn subrule_as(&mut self, occurrence: u32, rule: &str, label: &str) -> Step<R> {
        self.subrule_labeled(occurrence, rule, Some(label))
    }
}
