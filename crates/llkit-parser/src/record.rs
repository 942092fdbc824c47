use llkit_lexer::{Token, TokenTypeId};

use crate::{
    dsl::{Alt, Body, Dsl, RuleBody, Step},
    error::{DefinitionErrorKind, ErrorAccumulator},
    gast::{Alternative, Production, ProductionKind, Rule, MAX_OCCURRENCE},
};

/// Records the structure of a rule by running its body once.
///
/// Every alternative of every `or` is entered and every optional part is recorded
/// once. Lookahead always reports EOF, gates are evaluated only to record the rules
/// they backtrack into.
pub struct GrammarBuilder<'a> {
    rule: &'a str,
    frames: Vec<Vec<Production>>,
    backtracks: Vec<String>,
    eof: Token,
    err: &'a ErrorAccumulator,
}

impl<'a> GrammarBuilder<'a> {
    pub fn record<R: Default>(name: &'a str, body: &RuleBody<R>, err: &'a ErrorAccumulator) -> Rule {
        let mut builder = GrammarBuilder {
            rule: name,
            frames: vec![Vec::new()],
            backtracks: Vec::new(),
            eof: Token::eof(0),
            err,
        };

        // the recorder never interrupts, the value is meaningless
        let _ = body(&mut builder);

        let definition = builder.frames.pop().unwrap_or_default();
        assert!(builder.frames.is_empty(), "Unbalanced recording frames");

        Rule {
            name: name.to_owned(),
            definition,
            backtracks: builder.backtracks,
        }
    }

    fn push(&mut self, production: Production) {
        self.frames
            .last_mut()
            .expect("Recording outside of a rule")
            .push(production);
    }

    fn nested<T>(&mut self, fun: impl FnOnce(&mut Self) -> T) -> (Vec<Production>, T) {
        self.frames.push(Vec::new());
        let value = fun(self);
        let definition = self.frames.pop().unwrap_or_default();
        (definition, value)
    }

    fn check_occurrence(&self, kind: ProductionKind, occurrence: u32) {
        if occurrence > MAX_OCCURRENCE {
            self.err.error(
                DefinitionErrorKind::InvalidOccurrence,
                self.rule,
                format!(
                    "Invalid occurrence index {occurrence} of {} in rule '{}', must be at most {MAX_OCCURRENCE}",
                    kind.method_name(),
                    self.rule
                ),
            );
        }
    }

    fn record_body<R: Default>(&mut self, body: Body<'_, R>) -> Vec<Production> {
        let (definition, _) = self.nested(|this| body(this));
        definition
    }
}

impl<R: Default> Dsl<R> for GrammarBuilder<'_> {
    fn is_recording(&self) -> bool {
        true
    }

    fn la(&self, _distance: usize) -> &Token {
        &self.eof
    }

    fn consume_labeled(
        &mut self,
        occurrence: u32,
        token: TokenTypeId,
        _label: Option<&str>,
    ) -> Step<Token> {
        self.check_occurrence(ProductionKind::Consume, occurrence);
        self.push(Production::Terminal { token, occurrence });
        Ok(Token::eof(0))
    }

    fn subrule_labeled(&mut self, occurrence: u32, rule: &str, _label: Option<&str>) -> Step<R> {
        self.check_occurrence(ProductionKind::Subrule, occurrence);
        self.push(Production::NonTerminal {
            name: rule.to_owned(),
            target: None,
            occurrence,
        });
        Ok(R::default())
    }

    fn option(&mut self, occurrence: u32, body: Body<'_, R>) -> Step<bool> {
        self.check_occurrence(ProductionKind::Option, occurrence);
        let definition = self.record_body(body);
        self.push(Production::Option {
            definition,
            occurrence,
        });
        Ok(false)
    }

    fn many(&mut self, occurrence: u32, body: Body<'_, R>) -> Step<()> {
        self.check_occurrence(ProductionKind::Many, occurrence);
        let definition = self.record_body(body);
        self.push(Production::Repetition {
            definition,
            occurrence,
        });
        Ok(())
    }

    fn at_least_one(&mut self, occurrence: u32, body: Body<'_, R>) -> Step<()> {
        self.check_occurrence(ProductionKind::AtLeastOne, occurrence);
        let definition = self.record_body(body);
        self.push(Production::RepetitionMandatory {
            definition,
            occurrence,
        });
        Ok(())
    }

    fn many_sep(
        &mut self,
        occurrence: u32,
        separator: TokenTypeId,
        body: Body<'_, R>,
    ) -> Step<()> {
        self.check_occurrence(ProductionKind::ManySep, occurrence);
        let definition = self.record_body(body);
        self.push(Production::RepetitionWithSeparator {
            definition,
            separator,
            occurrence,
        });
        Ok(())
    }

    fn at_least_one_sep(
        &mut self,
        occurrence: u32,
        separator: TokenTypeId,
        body: Body<'_, R>,
    ) -> Step<()> {
        self.check_occurrence(ProductionKind::AtLeastOneSep, occurrence);
        let definition = self.record_body(body);
        self.push(Production::RepetitionMandatoryWithSeparator {
            definition,
            separator,
            occurrence,
        });
        Ok(())
    }

    fn or(&mut self, occurrence: u32, alternatives: &mut [Alt<'_, R>]) -> Step<R> {
        self.check_occurrence(ProductionKind::Or, occurrence);
        let mut recorded = Vec::with_capacity(alternatives.len());
        for alt in alternatives.iter_mut() {
            if let Some(gate) = alt.gate {
                gate(self);
            }
            let (definition, _) = self.nested(|this| (alt.body)(this));
            recorded.push(Alternative {
                definition,
                ignore_ambiguities: alt.ignore_ambiguities,
                has_gate: alt.gate.is_some(),
            });
        }
        self.push(Production::Alternation {
            alternatives: recorded,
            occurrence,
        });
        Ok(R::default())
    }

    fn backtrack(&mut self, rule: &str) -> bool {
        if !self.backtracks.iter().any(|r| r == rule) {
            self.backtracks.push(rule.to_owned());
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use llkit_lexer::{TokenType, Vocabulary};

    use super::*;
    use crate::dsl::rule_body;

    #[test]
    fn test_record_all_alternatives() {
        let mut vocabulary = Vocabulary::new();
        let a = vocabulary.define(TokenType::literal("A", "a"));
        let b = vocabulary.define(TokenType::literal("B", "b"));

        let body = rule_body::<()>(move |d| {
            d.option(0, &mut |d| {
                d.consume(0, a)?;
                Ok(())
            })?;
            d.or(
                0,
                &mut [
                    Alt::new(&mut |d| {
                        d.consume(1, a)?;
                        Ok(())
                    }),
                    Alt::new(&mut |d| {
                        d.subrule(0, "other")?;
                        Ok(())
                    })
                    .gate(&|d| d.la(1).kind == b)
                    .ignore_ambiguities(),
                ],
            )?;
            d.many_sep(0, b, &mut |d| {
                d.consume(2, a)?;
                Ok(())
            })
        });

        let err = ErrorAccumulator::new();
        let rule = GrammarBuilder::record("top", &body, &err);
        assert!(err.is_empty());
        assert_eq!(rule.definition.len(), 3);

        let Production::Alternation { alternatives, .. } = &rule.definition[1] else {
            panic!("expected an alternation, got {:?}", rule.definition[1]);
        };
        assert_eq!(alternatives.len(), 2);
        assert!(!alternatives[0].has_gate);
        assert!(alternatives[1].has_gate);
        assert!(alternatives[1].ignore_ambiguities);
        assert_eq!(
            alternatives[1].definition,
            [Production::NonTerminal {
                name: "other".into(),
                target: None,
                occurrence: 0
            }]
        );
        assert_eq!(rule.definition[2].separator(), Some(b));
    }

    #[test]
    fn test_invalid_occurrence() {
        let mut vocabulary = Vocabulary::new();
        let a = vocabulary.define(TokenType::literal("A", "a"));

        let body = rule_body::<()>(move |d| {
            d.consume(256, a)?;
            Ok(())
        });

        let err = ErrorAccumulator::new();
        GrammarBuilder::record("top", &body, &err);
        let errors = err.finish();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, DefinitionErrorKind::InvalidOccurrence);
    }
}
