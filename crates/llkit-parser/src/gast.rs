//! Grammar abstract syntax tree, the recorded structure of every rule body.

use std::fmt::Write;

use cranelift_entity::{entity_impl, PrimaryMap};
use llkit_lexer::{TokenTypeId, Vocabulary};
use serde::Serialize;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct RuleHandle(u32);

entity_impl! { RuleHandle }

impl RuleHandle {
    pub fn name(self, rules: &Rules) -> &str {
        &rules[self].name
    }
}

impl Serialize for RuleHandle {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u32(self.0)
    }
}

pub type Rules = PrimaryMap<RuleHandle, Rule>;

/// Largest occurrence index accepted by the DSL methods.
pub const MAX_OCCURRENCE: u32 = 255;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Rule {
    pub name: String,
    pub definition: Vec<Production>,
    /// Rules tried through `backtrack`, including from gates.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub backtracks: Vec<String>,
}

/// Kind of DSL method which recorded a production.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize)]
pub enum ProductionKind {
    Consume,
    Subrule,
    Option,
    Many,
    AtLeastOne,
    ManySep,
    AtLeastOneSep,
    Or,
}

impl ProductionKind {
    pub fn method_name(self) -> &'static str {
        match self {
            ProductionKind::Consume => "CONSUME",
            ProductionKind::Subrule => "SUBRULE",
            ProductionKind::Option => "OPTION",
            ProductionKind::Many => "MANY",
            ProductionKind::AtLeastOne => "AT_LEAST_ONE",
            ProductionKind::ManySep => "MANY_SEP",
            ProductionKind::AtLeastOneSep => "AT_LEAST_ONE_SEP",
            ProductionKind::Or => "OR",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Alternative {
    pub definition: Vec<Production>,
    pub ignore_ambiguities: bool,
    /// Gates are only known at parse time, the analysis treats the alternative as always enabled.
    pub has_gate: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum Production {
    NonTerminal {
        name: String,
        /// Filled in by name resolution.
        target: Option<RuleHandle>,
        occurrence: u32,
    },
    Terminal {
        token: TokenTypeId,
        occurrence: u32,
    },
    Option {
        definition: Vec<Production>,
        occurrence: u32,
    },
    Repetition {
        definition: Vec<Production>,
        occurrence: u32,
    },
    RepetitionMandatory {
        definition: Vec<Production>,
        occurrence: u32,
    },
    RepetitionWithSeparator {
        definition: Vec<Production>,
        separator: TokenTypeId,
        occurrence: u32,
    },
    RepetitionMandatoryWithSeparator {
        definition: Vec<Production>,
        separator: TokenTypeId,
        occurrence: u32,
    },
    Alternation {
        alternatives: Vec<Alternative>,
        occurrence: u32,
    },
}

impl Production {
    pub fn kind(&self) -> ProductionKind {
        match self {
            Production::NonTerminal { .. } => ProductionKind::Subrule,
            Production::Terminal { .. } => ProductionKind::Consume,
            Production::Option { .. } => ProductionKind::Option,
            Production::Repetition { .. } => ProductionKind::Many,
            Production::RepetitionMandatory { .. } => ProductionKind::AtLeastOne,
            Production::RepetitionWithSeparator { .. } => ProductionKind::ManySep,
            Production::RepetitionMandatoryWithSeparator { .. } => ProductionKind::AtLeastOneSep,
            Production::Alternation { .. } => ProductionKind::Or,
        }
    }
    pub fn occurrence(&self) -> u32 {
        match *self {
            Production::NonTerminal { occurrence, .. }
            | Production::Terminal { occurrence, .. }
            | Production::Option { occurrence, .. }
            | Production::Repetition { occurrence, .. }
            | Production::RepetitionMandatory { occurrence, .. }
            | Production::RepetitionWithSeparator { occurrence, .. }
            | Production::RepetitionMandatoryWithSeparator { occurrence, .. }
            | Production::Alternation { occurrence, .. } => occurrence,
        }
    }
    /// Body of the optional and repeated productions.
    pub fn definition(&self) -> Option<&[Production]> {
        match self {
            Production::Option { definition, .. }
            | Production::Repetition { definition, .. }
            | Production::RepetitionMandatory { definition, .. }
            | Production::RepetitionWithSeparator { definition, .. }
            | Production::RepetitionMandatoryWithSeparator { definition, .. } => Some(definition),
            Production::NonTerminal { .. }
            | Production::Terminal { .. }
            | Production::Alternation { .. } => None,
        }
    }
    pub fn separator(&self) -> Option<TokenTypeId> {
        match *self {
            Production::RepetitionWithSeparator { separator, .. }
            | Production::RepetitionMandatoryWithSeparator { separator, .. } => Some(separator),
            _ => None,
        }
    }
    pub fn is_repetition(&self) -> bool {
        matches!(
            self.kind(),
            ProductionKind::Many
                | ProductionKind::AtLeastOne
                | ProductionKind::ManySep
                | ProductionKind::AtLeastOneSep
        )
    }
    pub fn visit_nodes_top_down(&self, mut fun: impl FnMut(&Production)) {
        self.visit_nodes_(&mut fun)
    }
    pub fn visit_nodes_top_down_mut(&mut self, mut fun: impl FnMut(&mut Production)) {
        self.visit_nodes_mut_(&mut fun)
    }
    fn visit_nodes_(&self, fun: &mut dyn FnMut(&Production)) {
        fun(self);
        match self {
            Production::Alternation { alternatives, .. } => {
                for alternative in alternatives {
                    for p in &alternative.definition {
                        p.visit_nodes_(fun);
                    }
                }
            }
            Production::Option { definition, .. }
            | Production::Repetition { definition, .. }
            | Production::RepetitionMandatory { definition, .. }
            | Production::RepetitionWithSeparator { definition, .. }
            | Production::RepetitionMandatoryWithSeparator { definition, .. } => {
                for p in definition {
                    p.visit_nodes_(fun);
                }
            }
            Production::NonTerminal { .. } | Production::Terminal { .. } => {}
        }
    }
    fn visit_nodes_mut_(&mut self, fun: &mut dyn FnMut(&mut Production)) {
        fun(self);
        match self {
            Production::Alternation { alternatives, .. } => {
                for alternative in alternatives {
                    for p in &mut alternative.definition {
                        p.visit_nodes_mut_(fun);
                    }
                }
            }
            Production::Option { definition, .. }
            | Production::Repetition { definition, .. }
            | Production::RepetitionMandatory { definition, .. }
            | Production::RepetitionWithSeparator { definition, .. }
            | Production::RepetitionMandatoryWithSeparator { definition, .. } => {
                for p in definition {
                    p.visit_nodes_mut_(fun);
                }
            }
            Production::NonTerminal { .. } | Production::Terminal { .. } => {}
        }
    }
    #[allow(unused_must_use)]
    pub fn display_with_indent(
        &self,
        buf: &mut dyn std::fmt::Write,
        indent: u32,
        vocabulary: &Vocabulary,
    ) {
        for _ in 0..indent {
            write!(buf, "  ");
        }
        let method = self.kind().method_name();
        let occurrence = self.occurrence();
        match self {
            Production::NonTerminal { name, target, .. } => {
                let unresolved = if target.is_none() { " (unresolved)" } else { "" };
                writeln!(buf, "{method}{occurrence} {name}{unresolved}");
            }
            Production::Terminal { token, .. } => {
                writeln!(buf, "{method}{occurrence} {}", token.name(vocabulary));
            }
            Production::Alternation { alternatives, .. } => {
                writeln!(buf, "{method}{occurrence}");
                for (i, alternative) in alternatives.iter().enumerate() {
                    for _ in 0..=indent {
                        write!(buf, "  ");
                    }
                    write!(buf, "ALT{}", i + 1);
                    if alternative.has_gate {
                        write!(buf, " gated");
                    }
                    if alternative.ignore_ambiguities {
                        write!(buf, " ignore-ambiguities");
                    }
                    writeln!(buf);
                    for p in &alternative.definition {
                        p.display_with_indent(buf, indent + 2, vocabulary);
                    }
                }
            }
            _ => {
                write!(buf, "{method}{occurrence}");
                if let Some(separator) = self.separator() {
                    write!(buf, " sep {}", separator.name(vocabulary));
                }
                writeln!(buf);
                for p in self.definition().unwrap_or_default() {
                    p.display_with_indent(buf, indent + 1, vocabulary);
                }
            }
        }
    }
}

/// Per kind callbacks over a definition, the defaults descend into nested productions.
pub trait Visitor<'g> {
    fn visit_terminal(&mut self, _production: &'g Production, _token: TokenTypeId) {}
    fn visit_non_terminal(
        &mut self,
        _production: &'g Production,
        _name: &'g str,
        _target: Option<RuleHandle>,
    ) {
    }
    fn visit_option(&mut self, _production: &'g Production, definition: &'g [Production]) {
        walk_definition(self, definition);
    }
    fn visit_repetition(&mut self, _production: &'g Production, definition: &'g [Production]) {
        walk_definition(self, definition);
    }
    fn visit_alternation(&mut self, _production: &'g Production, alternatives: &'g [Alternative]) {
        for alternative in alternatives {
            walk_definition(self, &alternative.definition);
        }
    }
}

pub fn walk_definition<'g, V: Visitor<'g> + ?Sized>(visitor: &mut V, definition: &'g [Production]) {
    for production in definition {
        walk_production(visitor, production);
    }
}

pub fn walk_production<'g, V: Visitor<'g> + ?Sized>(visitor: &mut V, production: &'g Production) {
    match production {
        Production::Terminal { token, .. } => visitor.visit_terminal(production, *token),
        Production::NonTerminal { name, target, .. } => {
            visitor.visit_non_terminal(production, name, *target)
        }
        Production::Option { definition, .. } => visitor.visit_option(production, definition),
        Production::Repetition { definition, .. }
        | Production::RepetitionMandatory { definition, .. }
        | Production::RepetitionWithSeparator { definition, .. }
        | Production::RepetitionMandatoryWithSeparator { definition, .. } => {
            visitor.visit_repetition(production, definition)
        }
        Production::Alternation { alternatives, .. } => {
            visitor.visit_alternation(production, alternatives)
        }
    }
}

impl Rule {
    pub fn visit_nodes_top_down(&self, mut fun: impl FnMut(&Production)) {
        for p in &self.definition {
            p.visit_nodes_(&mut fun);
        }
    }
    pub fn visit_nodes_top_down_mut(&mut self, mut fun: impl FnMut(&mut Production)) {
        for p in &mut self.definition {
            p.visit_nodes_mut_(&mut fun);
        }
    }
    pub fn display(&self, buf: &mut dyn Write, vocabulary: &Vocabulary) -> std::fmt::Result {
        writeln!(buf, "rule {}", self.name)?;
        for p in &self.definition {
            p.display_with_indent(buf, 1, vocabulary);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use llkit_lexer::TokenType;

    #[test]
    fn test_visit_nodes() {
        let mut vocabulary = Vocabulary::new();
        let a = vocabulary.define(TokenType::literal("A", "a"));
        let comma = vocabulary.define(TokenType::literal("Comma", ","));

        let rule = Rule {
            name: "list".into(),
            definition: vec![Production::RepetitionWithSeparator {
                definition: vec![
                    Production::Terminal { token: a, occurrence: 0 },
                    Production::Alternation {
                        alternatives: vec![
                            Alternative {
                                definition: vec![Production::Terminal { token: a, occurrence: 1 }],
                                ignore_ambiguities: false,
                                has_gate: false,
                            },
                            Alternative {
                                definition: vec![],
                                ignore_ambiguities: false,
                                has_gate: true,
                            },
                        ],
                        occurrence: 0,
                    },
                ],
                separator: comma,
                occurrence: 0,
            }],
            backtracks: Vec::new(),
        };

        let mut kinds = Vec::new();
        rule.visit_nodes_top_down(|p| kinds.push(p.kind()));
        assert_eq!(
            kinds,
            [
                ProductionKind::ManySep,
                ProductionKind::Consume,
                ProductionKind::Or,
                ProductionKind::Consume
            ]
        );

        let mut out = String::new();
        rule.display(&mut out, &vocabulary).unwrap();
        assert_eq!(
            out,
            "rule list\n  MANY_SEP0 sep Comma\n    CONSUME0 A\n    OR0\n      ALT1\n        CONSUME1 A\n      ALT2 gated\n"
        );
    }
}
