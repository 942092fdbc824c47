//! Recovery inside repetitions, the loop either resumes with another iteration or
//! continues after itself once the parser skipped past the offending tokens.

use llkit_lexer::TokenTypeId;

use crate::{
    dsl::{Dsl, Interrupt, Step},
    error::RecognitionErrorKind,
    lookahead::{Decision, DecisionKey},
    parser::ParseContext,
};

impl<R: Default> ParseContext<'_, '_, R> {
    /// An iteration was interrupted, returns whether the loop should run another iteration.
    ///
    /// Gives up and restores the position when a token of the enclosing rules is found first.
    pub(crate) fn resume_repetition(
        &mut self,
        key: DecisionKey,
        decision: Option<&Decision>,
        separator: Option<TokenTypeId>,
        interrupt: Interrupt,
    ) -> Step<bool> {
        if !self.recovery_enabled() {
            return Err(interrupt);
        }

        let grammar = self.grammar;
        let exit = grammar.analysis.repetition_exits.get(&key);
        let start = self.position;

        loop {
            let kind = self.kind_at(self.position);
            if kind == TokenTypeId::EOF {
                break;
            }
            // resuming on the failing token would fail the same way again
            let resumes = self.position > start && self.repetition_continues(decision, separator);
            let exits = exit.is_some_and(|set| set.contains(kind));
            if resumes || exits {
                let skipped = self.tokens[start..self.position].to_vec();
                log::trace!(
                    "Recovered {}{} by skipping {} tokens",
                    key.kind.method_name(),
                    key.occurrence,
                    skipped.len()
                );
                self.errors[interrupt.error].resynced_tokens.extend(skipped);
                return Ok(resumes);
            }
            if self.in_enclosing_follows(kind) {
                break;
            }
            self.position += 1;
        }

        self.position = start;
        Err(interrupt)
    }

    /// The loop is about to exit on a token which cannot follow it, skips to the next
    /// iteration when one can be found before anything the enclosing rules expect.
    pub(crate) fn skip_to_next_iteration(
        &mut self,
        key: DecisionKey,
        decision: Option<&Decision>,
        separator: Option<TokenTypeId>,
    ) -> bool {
        if !self.recovery_enabled() {
            return false;
        }
        let grammar = self.grammar;
        let Some(exit) = grammar.analysis.repetition_exits.get(&key) else {
            return false;
        };
        let start = self.position;
        let kind = self.kind_at(start);
        if exit.is_empty()
            || kind == TokenTypeId::EOF
            || exit.contains(kind)
            || self.in_enclosing_follows(kind)
        {
            return false;
        }

        let mut index = start + 1;
        loop {
            let kind = self.kind_at(index);
            if kind == TokenTypeId::EOF {
                break;
            }
            self.position = index;
            let resumes = self.repetition_continues(decision, separator);
            if resumes || exit.contains(kind) {
                self.position = start;
                let found = self.describe(self.la(1));
                let message = format!(
                    "Expecting another iteration of {}{} or one of [{}] but found {}",
                    key.kind.method_name(),
                    key.occurrence,
                    exit.names(&grammar.vocabulary).join(", "),
                    found
                );
                let interrupt = self.record_error(RecognitionErrorKind::MismatchedToken, message);
                self.errors[interrupt.error].resynced_tokens = self.tokens[start..index].to_vec();
                self.position = index;
                return resumes;
            }
            if self.in_enclosing_follows(kind) {
                break;
            }
            index += 1;
        }

        self.position = start;
        false
    }
}
