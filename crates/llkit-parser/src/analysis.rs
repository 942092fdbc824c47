//! Static analysis over resolved rules: nullability, first sets, follow sets used by
//! error recovery and the lookahead decisions for every branching production.

use std::collections::{BTreeMap, HashMap};

use cranelift_bitset::CompoundBitSet;
use cranelift_entity::{EntityRef, EntitySet, SecondaryMap};
use llkit_lexer::{TokenTypeId, Vocabulary};

use crate::{
    gast::{Production, RuleHandle, Rules},
    lookahead::{Continuation, Decision, DecisionKey, PathBuilder, Segment},
};

#[derive(Clone, Default)]
pub struct TokenSet(CompoundBitSet);

impl TokenSet {
    pub fn new() -> TokenSet {
        TokenSet(CompoundBitSet::new())
    }
    /// Returns whether the token was newly added.
    pub fn insert(&mut self, token: TokenTypeId) -> bool {
        if self.0.contains(token.index()) {
            return false;
        }
        self.0.insert(token.index());
        true
    }
    pub fn contains(&self, token: TokenTypeId) -> bool {
        self.0.contains(token.index())
    }
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
    pub fn iter(&self) -> impl Iterator<Item = TokenTypeId> + '_ {
        self.0.iter().map(TokenTypeId::new)
    }
    pub fn union_with(&mut self, other: &TokenSet) -> bool {
        let mut changed = false;
        for token in other.iter() {
            changed |= self.insert(token);
        }
        changed
    }
    /// Adds every member of the categories in the set, so that `contains` can be
    /// queried with the type of an actual token.
    pub fn with_subtypes(&self, vocabulary: &Vocabulary) -> TokenSet {
        let mut out = self.clone();
        for token in self.iter() {
            for &subtype in vocabulary.subtypes(token) {
                out.insert(subtype);
            }
        }
        out
    }
    pub fn names(&self, vocabulary: &Vocabulary) -> Vec<String> {
        self.iter().map(|t| t.name(vocabulary).to_owned()).collect()
    }
}

impl PartialEq for TokenSet {
    fn eq(&self, other: &Self) -> bool {
        self.iter().eq(other.iter())
    }
}

impl Eq for TokenSet {}

impl std::fmt::Debug for TokenSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

pub struct FirstSets {
    nullable: EntitySet<RuleHandle>,
    first: SecondaryMap<RuleHandle, TokenSet>,
}

impl FirstSets {
    /// Both properties are computed as fixpoints, so recursive grammars are fine here.
    pub fn new(rules: &Rules) -> FirstSets {
        let mut this = FirstSets {
            nullable: EntitySet::new(),
            first: SecondaryMap::new(),
        };

        loop {
            let mut changed = false;
            for (handle, rule) in rules.iter() {
                if !this.nullable.contains(handle) && this.is_nullable_seq(&rule.definition) {
                    this.nullable.insert(handle);
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }

        loop {
            let mut changed = false;
            for (handle, rule) in rules.iter() {
                let mut set = TokenSet::new();
                this.first_of_seq(&rule.definition, &mut set);
                changed |= this.first[handle].union_with(&set);
            }
            if !changed {
                break;
            }
        }

        this
    }

    pub fn is_nullable(&self, rule: RuleHandle) -> bool {
        self.nullable.contains(rule)
    }

    pub fn first(&self, rule: RuleHandle) -> &TokenSet {
        &self.first[rule]
    }

    pub fn is_nullable_seq(&self, definition: &[Production]) -> bool {
        definition.iter().all(|p| self.is_nullable_production(p))
    }

    pub fn is_nullable_production(&self, production: &Production) -> bool {
        match production {
            Production::Terminal { .. } => false,
            Production::NonTerminal { target, .. } => target.is_some_and(|t| self.is_nullable(t)),
            Production::Option { .. }
            | Production::Repetition { .. }
            | Production::RepetitionWithSeparator { .. } => true,
            Production::RepetitionMandatory { definition, .. }
            | Production::RepetitionMandatoryWithSeparator { definition, .. } => {
                self.is_nullable_seq(definition)
            }
            Production::Alternation { alternatives, .. } => alternatives
                .iter()
                .any(|a| self.is_nullable_seq(&a.definition)),
        }
    }

    /// Adds the tokens which can start `definition` into `out`, returns whether it is nullable.
    pub fn first_of_seq(&self, definition: &[Production], out: &mut TokenSet) -> bool {
        for production in definition {
            self.first_of_production(production, out);
            if !self.is_nullable_production(production) {
                return false;
            }
        }
        true
    }

    fn first_of_production(&self, production: &Production, out: &mut TokenSet) {
        match production {
            Production::Terminal { token, .. } => {
                out.insert(*token);
            }
            Production::NonTerminal { target, .. } => {
                if let Some(target) = *target {
                    out.union_with(&self.first[target]);
                }
            }
            Production::Alternation { alternatives, .. } => {
                for alternative in alternatives {
                    self.first_of_seq(&alternative.definition, out);
                }
            }
            _ => {
                if let Some(definition) = production.definition() {
                    self.first_of_seq(definition, out);
                }
            }
        }
    }

    /// Tokens which can start the continuation, returns whether it can be empty.
    pub fn first_of_continuation(&self, rest: &[Segment], out: &mut TokenSet) -> bool {
        for segment in rest.iter().rev() {
            match *segment {
                Segment::Token(token) => {
                    out.insert(token);
                    return false;
                }
                Segment::Seq(definition) => {
                    if !self.first_of_seq(definition, out) {
                        return false;
                    }
                }
                Segment::Repeat { body, separator } => match separator {
                    Some(separator) => {
                        out.insert(separator);
                    }
                    None => {
                        self.first_of_seq(body, out);
                    }
                },
            }
        }
        true
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct CallSite {
    pub caller: RuleHandle,
    pub callee: RuleHandle,
    pub occurrence: u32,
}

/// Everything the runtime needs to know about the grammar besides the rule bodies.
#[derive(Clone, Debug, PartialEq)]
pub struct Analysis {
    pub decisions: BTreeMap<DecisionKey, Decision>,
    /// Tokens which may follow a terminal within its rule, used for single token insertion.
    pub terminal_follows: HashMap<(RuleHandle, TokenTypeId, u32), TokenSet>,
    /// Tokens which may follow a subrule call within the caller, used to resynchronize.
    pub call_follows: HashMap<CallSite, TokenSet>,
    /// Tokens which may follow a repetition within its rule.
    pub repetition_exits: HashMap<DecisionKey, TokenSet>,
}

impl Analysis {
    pub fn new(rules: &Rules, first: &FirstSets, vocabulary: &Vocabulary, k: usize) -> Analysis {
        let mut walker = Walker {
            paths: PathBuilder::new(rules, vocabulary),
            first,
            vocabulary,
            k,
            rule: RuleHandle::new(0),
            analysis: Analysis {
                decisions: BTreeMap::new(),
                terminal_follows: HashMap::new(),
                call_follows: HashMap::new(),
                repetition_exits: HashMap::new(),
            },
        };

        for (handle, rule) in rules.iter() {
            walker.rule = handle;
            let mut rest = Vec::new();
            walker.walk(&rule.definition, &mut rest);
        }

        log::debug!(
            "Computed {} lookahead decisions for {} rules",
            walker.analysis.decisions.len(),
            rules.len()
        );

        walker.analysis
    }

    pub fn decision(&self, key: &DecisionKey) -> Option<&Decision> {
        self.decisions.get(key)
    }
}

struct Walker<'g> {
    paths: PathBuilder<'g>,
    first: &'g FirstSets,
    vocabulary: &'g Vocabulary,
    k: usize,
    rule: RuleHandle,
    analysis: Analysis,
}

impl<'g> Walker<'g> {
    fn walk(&mut self, definition: &'g [Production], rest: &mut Continuation<'g>) {
        for (i, production) in definition.iter().enumerate() {
            rest.push(Segment::Seq(&definition[i + 1..]));
            self.visit(production, rest);
            rest.pop();
        }
    }

    fn follow_of(&self, rest: &[Segment]) -> TokenSet {
        let mut set = TokenSet::new();
        self.first.first_of_continuation(rest, &mut set);
        set.with_subtypes(self.vocabulary)
    }

    fn key(&self, production: &Production) -> DecisionKey {
        DecisionKey {
            rule: self.rule,
            kind: production.kind(),
            occurrence: production.occurrence(),
        }
    }

    fn visit(&mut self, production: &'g Production, rest: &mut Continuation<'g>) {
        match production {
            Production::Terminal { token, occurrence } => {
                let follow = self.follow_of(rest);
                self.analysis
                    .terminal_follows
                    .insert((self.rule, *token, *occurrence), follow);
            }
            Production::NonTerminal {
                target, occurrence, ..
            } => {
                if let Some(callee) = *target {
                    let follow = self.follow_of(rest);
                    let site = CallSite {
                        caller: self.rule,
                        callee,
                        occurrence: *occurrence,
                    };
                    self.analysis.call_follows.insert(site, follow);
                }
            }
            Production::Alternation { alternatives, .. } => {
                let branches = alternatives
                    .iter()
                    .map(|a| vec![Segment::Seq(&a.definition)])
                    .collect::<Vec<_>>();
                let paths = self.paths.lookahead_paths(&branches, self.k);
                let decision = Decision::new(paths, self.vocabulary);
                self.analysis.decisions.insert(self.key(production), decision);

                for alternative in alternatives {
                    self.walk(&alternative.definition, rest);
                }
            }
            _ => {
                let key = self.key(production);
                let definition = production.definition().unwrap_or_default();
                let separator = production.separator();

                // entering competes with whatever follows the production, a loop
                // additionally continues with further iterations after its body
                let exit = rest.clone();
                let mut enter = rest.clone();
                if production.is_repetition() {
                    enter.push(Segment::Repeat {
                        body: definition,
                        separator,
                    });
                }
                enter.push(Segment::Seq(definition));

                let paths = self.paths.lookahead_paths(&[enter, exit], self.k);
                let inside = paths.into_iter().next().unwrap_or_default();
                let decision = Decision::new(vec![inside], self.vocabulary);
                self.analysis.decisions.insert(key, decision);

                if production.is_repetition() {
                    let follow = self.follow_of(rest);
                    self.analysis.repetition_exits.insert(key, follow);
                    rest.push(Segment::Repeat {
                        body: definition,
                        separator,
                    });
                    self.walk(definition, rest);
                    rest.pop();
                } else {
                    self.walk(definition, rest);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use cranelift_entity::PrimaryMap;
    use llkit_lexer::TokenType;

    use super::*;
    use crate::gast::{ProductionKind, Rule};

    #[test]
    fn test_nullable_and_first() {
        let mut vocabulary = Vocabulary::new();
        let a = vocabulary.define(TokenType::literal("A", "a"));
        let b = vocabulary.define(TokenType::literal("B", "b"));

        let mut rules: Rules = PrimaryMap::new();
        let opt = rules.push(Rule {
            name: "opt".into(),
            definition: vec![Production::Option {
                definition: vec![Production::Terminal {
                    token: a,
                    occurrence: 0,
                }],
                occurrence: 0,
            }],
            backtracks: Vec::new(),
        });
        let seq = rules.push(Rule {
            name: "seq".into(),
            definition: vec![
                Production::NonTerminal {
                    name: "opt".into(),
                    target: Some(opt),
                    occurrence: 0,
                },
                Production::Terminal {
                    token: b,
                    occurrence: 0,
                },
            ],
            backtracks: Vec::new(),
        });

        let first = FirstSets::new(&rules);
        assert!(first.is_nullable(opt));
        assert!(!first.is_nullable(seq));
        assert_eq!(first.first(seq).iter().collect::<Vec<_>>(), [a, b]);
    }

    #[test]
    fn test_follows() {
        let mut vocabulary = Vocabulary::new();
        let number = vocabulary.define(TokenType::regex("Number", "[0-9]+"));
        let plus = vocabulary.define(TokenType::literal("Plus", "+"));
        let semi = vocabulary.define(TokenType::literal("Semi", ";"));

        // expr: Number (Plus Number)* Semi
        let mut rules: Rules = PrimaryMap::new();
        let expr = rules.push(Rule {
            name: "expr".into(),
            definition: vec![
                Production::Terminal {
                    token: number,
                    occurrence: 1,
                },
                Production::Repetition {
                    definition: vec![
                        Production::Terminal {
                            token: plus,
                            occurrence: 0,
                        },
                        Production::Terminal {
                            token: number,
                            occurrence: 2,
                        },
                    ],
                    occurrence: 0,
                },
                Production::Terminal {
                    token: semi,
                    occurrence: 0,
                },
            ],
            backtracks: Vec::new(),
        });

        let first = FirstSets::new(&rules);
        let analysis = Analysis::new(&rules, &first, &vocabulary, 3);

        let follow = &analysis.terminal_follows[&(expr, number, 1)];
        assert_eq!(follow.iter().collect::<Vec<_>>(), [plus, semi]);
        let follow = &analysis.terminal_follows[&(expr, number, 2)];
        assert_eq!(follow.iter().collect::<Vec<_>>(), [plus, semi]);

        let key = DecisionKey {
            rule: expr,
            kind: ProductionKind::Many,
            occurrence: 0,
        };
        assert_eq!(analysis.decisions[&key].alternatives, [vec![vec![plus]]]);
        assert_eq!(
            analysis.repetition_exits[&key].iter().collect::<Vec<_>>(),
            [semi]
        );
    }
}
