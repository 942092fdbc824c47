//! Computes the token sequences which select between the alternatives of a decision.
//!
//! Paths are grown one token at a time and an alternative stops growing a path as soon
//! as no other alternative can produce it, so most decisions end up needing a single
//! token even when `k` is larger.

use std::collections::HashSet;

use cranelift_entity::EntityRef;
use llkit_lexer::{Token, TokenTypeId, Vocabulary};

use crate::gast::{Production, ProductionKind, RuleHandle, Rules};

pub type Path = Vec<TokenTypeId>;

/// What remains to be parsed, the last segment is parsed first.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Segment<'g> {
    Seq(&'g [Production]),
    /// Zero or more further iterations, each starting with the separator if any.
    Repeat {
        body: &'g [Production],
        separator: Option<TokenTypeId>,
    },
    Token(TokenTypeId),
}

pub type Continuation<'g> = Vec<Segment<'g>>;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct DecisionKey {
    pub rule: RuleHandle,
    pub kind: ProductionKind,
    pub occurrence: u32,
}

#[derive(Clone, Debug)]
struct Partial<'g> {
    path: Path,
    rest: Continuation<'g>,
}

pub struct PathBuilder<'g> {
    rules: &'g Rules,
    vocabulary: &'g Vocabulary,
}

impl<'g> PathBuilder<'g> {
    pub fn new(rules: &'g Rules, vocabulary: &'g Vocabulary) -> Self {
        Self { rules, vocabulary }
    }

    /// Extends `path` until it has `max_len` tokens or `rest` runs out, once for every
    /// way the grammar can branch.
    fn expand(&self, path: Path, rest: Continuation<'g>, max_len: usize, out: &mut Vec<Partial<'g>>) {
        let mut work = vec![Partial { path, rest }];

        'work: while let Some(Partial { mut path, mut rest }) = work.pop() {
            loop {
                if path.len() >= max_len {
                    break;
                }
                let Some(segment) = rest.pop() else {
                    break;
                };
                match segment {
                    Segment::Token(token) => path.push(token),
                    Segment::Seq([]) => {}
                    Segment::Seq([first, tail @ ..]) => {
                        if !tail.is_empty() {
                            rest.push(Segment::Seq(tail));
                        }
                        match first {
                            Production::Terminal { token, .. } => path.push(*token),
                            Production::NonTerminal { target, .. } => {
                                if let Some(target) = *target {
                                    rest.push(Segment::Seq(&self.rules[target].definition));
                                }
                            }
                            Production::Option { definition, .. } => {
                                let mut enter = rest.clone();
                                enter.push(Segment::Seq(definition));
                                work.push(Partial {
                                    path: path.clone(),
                                    rest,
                                });
                                work.push(Partial { path, rest: enter });
                                continue 'work;
                            }
                            Production::Repetition { definition, .. } => {
                                rest.push(Segment::Repeat {
                                    body: definition,
                                    separator: None,
                                });
                            }
                            Production::RepetitionWithSeparator {
                                definition,
                                separator,
                                ..
                            } => {
                                let mut enter = rest.clone();
                                enter.push(Segment::Repeat {
                                    body: definition,
                                    separator: Some(*separator),
                                });
                                enter.push(Segment::Seq(definition));
                                work.push(Partial {
                                    path: path.clone(),
                                    rest,
                                });
                                work.push(Partial { path, rest: enter });
                                continue 'work;
                            }
                            Production::RepetitionMandatory { definition, .. } => {
                                rest.push(Segment::Repeat {
                                    body: definition,
                                    separator: None,
                                });
                                rest.push(Segment::Seq(definition));
                            }
                            Production::RepetitionMandatoryWithSeparator {
                                definition,
                                separator,
                                ..
                            } => {
                                rest.push(Segment::Repeat {
                                    body: definition,
                                    separator: Some(*separator),
                                });
                                rest.push(Segment::Seq(definition));
                            }
                            Production::Alternation { alternatives, .. } => {
                                // reversed so that the first alternative is expanded first
                                for alternative in alternatives.iter().rev() {
                                    let mut branch = rest.clone();
                                    branch.push(Segment::Seq(&alternative.definition));
                                    work.push(Partial {
                                        path: path.clone(),
                                        rest: branch,
                                    });
                                }
                                continue 'work;
                            }
                        }
                    }
                    Segment::Repeat { body, separator } => {
                        let mut enter = rest.clone();
                        enter.push(Segment::Repeat { body, separator });
                        enter.push(Segment::Seq(body));
                        if let Some(separator) = separator {
                            enter.push(Segment::Token(separator));
                        }
                        work.push(Partial {
                            path: path.clone(),
                            rest,
                        });
                        work.push(Partial { path, rest: enter });
                        continue 'work;
                    }
                }
            }
            out.push(Partial { path, rest });
        }
    }

    /// Every concrete sequence of token types a path stands for, categories are
    /// replaced by each of their members.
    fn path_keys(&self, path: &[TokenTypeId]) -> Vec<Path> {
        let mut keys = vec![Vec::new()];
        for &token in path {
            let mut longer = Vec::with_capacity(keys.len());
            for key in &keys {
                for &variant in std::iter::once(&token).chain(self.vocabulary.subtypes(token)) {
                    let mut key = key.clone();
                    key.push(variant);
                    longer.push(key);
                }
            }
            keys = longer;
        }
        keys
    }

    /// Lookahead paths of length at most `k` for each alternative, in alternative order.
    pub fn lookahead_paths(&self, alternatives: &[Continuation<'g>], k: usize) -> Vec<Vec<Path>> {
        let count = alternatives.len();

        let mut partial = alternatives
            .iter()
            .map(|rest| {
                let mut out = Vec::new();
                self.expand(Vec::new(), rest.clone(), 1, &mut out);
                out
            })
            .collect::<Vec<_>>();

        let mut known = partial
            .iter()
            .map(|paths| {
                paths
                    .iter()
                    .flat_map(|p| self.path_keys(&p.path))
                    .collect::<HashSet<_>>()
            })
            .collect::<Vec<_>>();

        let mut result = vec![Vec::<Path>::new(); count];

        for length in 1..=k.max(1) {
            let current = std::mem::replace(&mut partial, vec![Vec::new(); count]);
            for (index, paths) in current.into_iter().enumerate() {
                for Partial { path, rest } in paths {
                    let keys = self.path_keys(&path);
                    let unique = keys.iter().all(|key| {
                        known
                            .iter()
                            .enumerate()
                            .all(|(other, set)| other == index || !set.contains(key))
                    });

                    if unique || rest.is_empty() || path.len() >= k {
                        if !result[index].contains(&path) {
                            known[index].extend(keys);
                            result[index].push(path);
                        }
                    } else {
                        let mut out = Vec::new();
                        self.expand(path, rest, length + 1, &mut out);
                        for p in &out {
                            known[index].extend(self.path_keys(&p.path));
                        }
                        partial[index].extend(out);
                    }
                }
            }
        }

        result
    }
}

/// Lookahead function of a single decision.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Decision {
    pub alternatives: Vec<Vec<Path>>,
    // token type index -> alternative, only when every path has a single token
    table: Option<Vec<Option<u8>>>,
}

impl Decision {
    pub fn new(alternatives: Vec<Vec<Path>>, vocabulary: &Vocabulary) -> Decision {
        let single_token = alternatives.len() <= usize::from(u8::MAX) + 1
            && alternatives.iter().flatten().all(|path| path.len() == 1);

        let table = single_token.then(|| {
            let mut table = vec![None; vocabulary.len()];
            for (index, paths) in alternatives.iter().enumerate() {
                for path in paths {
                    let token = path[0];
                    for &variant in std::iter::once(&token).chain(vocabulary.subtypes(token)) {
                        let slot = &mut table[variant.index()];
                        if slot.is_none() {
                            *slot = Some(index as u8);
                        }
                    }
                }
            }
            table
        });

        Decision {
            alternatives,
            table,
        }
    }

    /// Index of the first alternative whose lookahead matches the remaining input.
    ///
    /// `enabled` masks out alternatives whose gate failed.
    pub fn choose(
        &self,
        remaining: &[Token],
        vocabulary: &Vocabulary,
        enabled: Option<&[bool]>,
    ) -> Option<usize> {
        let kind_at = |i: usize| remaining.get(i).map_or(TokenTypeId::EOF, |t| t.kind);

        if let (Some(table), None) = (&self.table, enabled) {
            return table.get(kind_at(0).index()).copied().flatten().map(usize::from);
        }

        self.alternatives.iter().enumerate().position(|(index, paths)| {
            if enabled.is_some_and(|enabled| !enabled[index]) {
                return false;
            }
            paths.iter().any(|path| {
                path.iter()
                    .enumerate()
                    .all(|(i, &expected)| vocabulary.matches(kind_at(i), expected))
            })
        })
    }

    #[allow(unused_must_use)]
    pub fn display(&self, buf: &mut dyn std::fmt::Write, vocabulary: &Vocabulary) {
        for (index, paths) in self.alternatives.iter().enumerate() {
            write!(buf, "  {}:", index + 1);
            for path in paths {
                write!(buf, " [");
                for (i, token) in path.iter().enumerate() {
                    if i > 0 {
                        write!(buf, " ");
                    }
                    write!(buf, "{}", token.name(vocabulary));
                }
                write!(buf, "]");
            }
            writeln!(buf);
        }
    }
}

#[cfg(test)]
mod tests {
    use cranelift_entity::PrimaryMap;
    use llkit_lexer::TokenType;

    use super::*;
    use crate::gast::Rule;

    fn terminal(token: TokenTypeId) -> Production {
        Production::Terminal {
            token,
            occurrence: 0,
        }
    }

    #[test]
    fn test_paths_grow_until_unique() {
        let mut vocabulary = Vocabulary::new();
        let a = vocabulary.define(TokenType::literal("A", "a"));
        let b = vocabulary.define(TokenType::literal("B", "b"));
        let c = vocabulary.define(TokenType::literal("C", "c"));
        let rules: Rules = PrimaryMap::new();

        let first = [terminal(a), terminal(b)];
        let second = [terminal(a), terminal(c)];
        let third = [terminal(c)];
        let builder = PathBuilder::new(&rules, &vocabulary);
        let paths = builder.lookahead_paths(
            &[
                vec![Segment::Seq(&first)],
                vec![Segment::Seq(&second)],
                vec![Segment::Seq(&third)],
            ],
            3,
        );
        assert_eq!(paths, [vec![vec![a, b]], vec![vec![a, c]], vec![vec![c]]]);

        let decision = Decision::new(paths, &vocabulary);
        assert!(!decision.table.is_some());

        let token = |kind| Token {
            kind,
            ..Token::eof(0)
        };
        assert_eq!(decision.choose(&[token(a), token(c)], &vocabulary, None), Some(1));
        assert_eq!(decision.choose(&[token(c)], &vocabulary, None), Some(2));
        assert_eq!(decision.choose(&[token(b)], &vocabulary, None), None);
        assert_eq!(
            decision.choose(&[token(c)], &vocabulary, Some(&[true, true, false])),
            None
        );
    }

    #[test]
    fn test_paths_through_rules_and_repetitions() {
        let mut vocabulary = Vocabulary::new();
        let literal = vocabulary.define(TokenType::category("Literal"));
        let int = vocabulary.define(TokenType::regex("Int", "[0-9]+").in_category(literal));
        let comma = vocabulary.define(TokenType::literal("Comma", ","));
        let semi = vocabulary.define(TokenType::literal("Semi", ";"));

        let mut rules: Rules = PrimaryMap::new();
        let value = rules.push(Rule {
            name: "value".into(),
            definition: vec![terminal(literal)],
            backtracks: Vec::new(),
        });

        let list = [Production::RepetitionWithSeparator {
            definition: vec![Production::NonTerminal {
                name: "value".into(),
                target: Some(value),
                occurrence: 0,
            }],
            separator: comma,
            occurrence: 0,
        }];
        let end = [terminal(semi)];

        let builder = PathBuilder::new(&rules, &vocabulary);
        let paths = builder.lookahead_paths(
            &[vec![Segment::Seq(&end), Segment::Seq(&list)], vec![Segment::Seq(&[])]],
            2,
        );
        assert_eq!(paths, [vec![vec![literal], vec![semi]], vec![vec![]]]);

        let decision = Decision::new(paths, &vocabulary);
        let token = |kind| Token {
            kind,
            ..Token::eof(0)
        };
        assert_eq!(decision.choose(&[token(int)], &vocabulary, None), Some(0));
        assert_eq!(decision.choose(&[token(comma)], &vocabulary, None), Some(1));
    }

    #[test]
    fn test_single_token_table() {
        let mut vocabulary = Vocabulary::new();
        let a = vocabulary.define(TokenType::literal("A", "a"));
        let b = vocabulary.define(TokenType::literal("B", "b"));

        let decision = Decision::new(vec![vec![vec![a]], vec![vec![b], vec![a]]], &vocabulary);
        assert!(decision.table.is_some());

        let token = |kind| Token {
            kind,
            ..Token::eof(0)
        };
        assert_eq!(decision.choose(&[token(a)], &vocabulary, None), Some(0));
        assert_eq!(decision.choose(&[token(b)], &vocabulary, None), Some(1));
        assert_eq!(decision.choose(&[], &vocabulary, None), None);
        // a gate mask bypasses the table
        assert_eq!(decision.choose(&[token(a)], &vocabulary, Some(&[false, true])), Some(1));
    }
}
