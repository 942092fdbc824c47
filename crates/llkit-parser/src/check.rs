use std::collections::{BTreeSet, HashMap};

use cranelift_entity::{EntitySet, SecondaryMap};
use llkit_lexer::{TokenTypeId, Vocabulary};

use crate::{
    analysis::{Analysis, FirstSets},
    error::{DefinitionErrorKind, ErrorAccumulator},
    gast::{walk_definition, Alternative, Production, ProductionKind, RuleHandle, Rules, Visitor},
    lookahead::{DecisionKey, Path},
};

/// Largest number of alternatives in a single alternation.
pub const MAX_ALTERNATIVES: usize = 255;

struct StructureCheck<'a> {
    rule: &'a str,
    first: &'a FirstSets,
    err: &'a ErrorAccumulator,
}

impl<'g> Visitor<'g> for StructureCheck<'_> {
    fn visit_repetition(&mut self, production: &'g Production, definition: &'g [Production]) {
        if self.first.is_nullable_seq(definition) {
            self.err.error(
                DefinitionErrorKind::EmptyRepetition,
                self.rule,
                format!(
                    "The repetition <{}{}> within Rule <{}> can never consume any tokens.\nThis could lead to an infinite loop.",
                    production.kind().method_name(),
                    production.occurrence(),
                    self.rule
                ),
            );
        }
        walk_definition(self, definition);
    }

    fn visit_alternation(&mut self, production: &'g Production, alternatives: &'g [Alternative]) {
        if alternatives.len() > MAX_ALTERNATIVES {
            self.err.error(
                DefinitionErrorKind::TooManyAlternatives,
                self.rule,
                format!(
                    "An Alternation cannot have more than {MAX_ALTERNATIVES} alternatives:\n<OR{}> inside <{}> Rule.\n has {} alternatives.",
                    production.occurrence(),
                    self.rule,
                    alternatives.len()
                ),
            );
        }
        for alternative in alternatives {
            walk_definition(self, &alternative.definition);
        }
    }
}

/// Checks which only need resolved rules, any error here prevents the analysis from running.
pub fn check_structure(rules: &Rules, first: &FirstSets, vocabulary: &Vocabulary, err: &ErrorAccumulator) {
    check_left_recursion(rules, first, err);
    for (_, rule) in rules.iter() {
        check_occurrences(&rule.name, &rule.definition, vocabulary, err);
        let mut check = StructureCheck {
            rule: &rule.name,
            first,
            err,
        };
        walk_definition(&mut check, &rule.definition);
    }
}

/// Checks of the computed lookahead, these are warnings outside of strict mode.
pub fn check_lookahead(
    rules: &Rules,
    first: &FirstSets,
    analysis: &Analysis,
    vocabulary: &Vocabulary,
    err: &ErrorAccumulator,
) {
    for (handle, rule) in rules.iter() {
        rule.visit_nodes_top_down(|p| {
            let Production::Alternation { alternatives, occurrence } = p else {
                return;
            };

            let last = alternatives.len().saturating_sub(1);
            for (index, alternative) in alternatives.iter().enumerate() {
                if index < last && !alternative.has_gate && first.is_nullable_seq(&alternative.definition) {
                    err.error(
                        DefinitionErrorKind::EmptyAlternative,
                        &rule.name,
                        format!(
                            "Ambiguous empty alternative: <{}> in <OR{occurrence}> inside <{}> Rule.\nOnly the last alternative may be an empty alternative.",
                            index + 1,
                            rule.name
                        ),
                    );
                }
            }

            let key = DecisionKey {
                rule: handle,
                kind: ProductionKind::Or,
                occurrence: *occurrence,
            };
            let Some(decision) = analysis.decision(&key) else {
                return;
            };

            let exempt = |i: usize| alternatives[i].ignore_ambiguities || alternatives[i].has_gate;

            // identical paths, each offending path is reported once
            let mut reported = BTreeSet::new();
            for (i, paths) in decision.alternatives.iter().enumerate() {
                if exempt(i) {
                    continue;
                }
                for path in paths {
                    if path.is_empty() || reported.contains(path) {
                        continue;
                    }
                    let mut ambiguous = decision
                        .alternatives
                        .iter()
                        .enumerate()
                        .filter(|&(j, other)| j != i && !exempt(j) && other.iter().any(|o| paths_overlap(o, path, vocabulary)))
                        .map(|(j, _)| j + 1)
                        .collect::<Vec<_>>();
                    if ambiguous.is_empty() {
                        continue;
                    }
                    ambiguous.insert(0, i + 1);
                    ambiguous.sort_unstable();
                    reported.insert(path.clone());
                    err.error(
                        DefinitionErrorKind::AmbiguousAlternatives,
                        &rule.name,
                        format!(
                            "Ambiguous alternatives: <{}> due to common lookahead prefix\nin <OR{occurrence}> inside <{}> Rule,\n<{}> may appears as a prefix path in all these alternatives.",
                            join(&ambiguous),
                            rule.name,
                            display_path(path, vocabulary)
                        ),
                    );
                }
            }

            // an earlier alternative shadows a later one whose path it prefixes
            for (i, earlier) in decision.alternatives.iter().enumerate() {
                if exempt(i) {
                    continue;
                }
                for (j, later) in decision.alternatives.iter().enumerate().skip(i + 1) {
                    if exempt(j) {
                        continue;
                    }
                    for short in earlier {
                        for long in later {
                            if !short.is_empty()
                                && short.len() < long.len()
                                && paths_overlap(short, &long[..short.len()], vocabulary)
                            {
                                err.error(
                                    DefinitionErrorKind::AmbiguousPrefix,
                                    &rule.name,
                                    format!(
                                        "Ambiguous alternatives: <{}> in <OR{occurrence}> inside <{}> Rule,\n<{}> may appears as a prefix path in all these alternatives.\nThe earlier alternative is always chosen for this input.",
                                        join(&[i + 1, j + 1]),
                                        rule.name,
                                        display_path(short, vocabulary)
                                    ),
                                );
                            }
                        }
                    }
                }
            }
        });
    }
}

fn paths_overlap(a: &[TokenTypeId], b: &[TokenTypeId], vocabulary: &Vocabulary) -> bool {
    a.len() == b.len()
        && a.iter()
            .zip(b)
            .all(|(&x, &y)| vocabulary.matches(x, y) || vocabulary.matches(y, x))
}

fn display_path(path: &Path, vocabulary: &Vocabulary) -> String {
    path.iter()
        .map(|t| t.name(vocabulary))
        .collect::<Vec<_>>()
        .join(", ")
}

fn join(indices: &[usize]) -> String {
    indices
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join(" ,")
}

fn check_occurrences(rule: &str, definition: &[Production], vocabulary: &Vocabulary, err: &ErrorAccumulator) {
    let mut seen = HashMap::new();
    for production in definition {
        production.visit_nodes_top_down(|p| {
            let argument = match p {
                Production::Terminal { token, .. } => Some(token.name(vocabulary).to_owned()),
                Production::NonTerminal { name, .. } => Some(name.clone()),
                _ => None,
            };
            let count = seen.entry((p.kind(), argument.clone(), p.occurrence())).or_insert(0);
            *count += 1;
            if *count == 2 {
                let argument = argument.map(|a| format!(" with argument: ->{a}<-")).unwrap_or_default();
                err.error(
                    DefinitionErrorKind::DuplicateOccurrence,
                    rule,
                    format!(
                        "->{}{}<-{argument}\n appears more than once ({}) in the top level rule: ->{rule}<-.\n Each use of a DSL method within a rule needs a distinct occurrence index.",
                        p.kind().method_name(),
                        p.occurrence(),
                        count
                    ),
                );
            }
        });
    }
}

pub fn check_left_recursion(rules: &Rules, first: &FirstSets, err: &ErrorAccumulator) {
    let mut prefix_rules = SecondaryMap::<RuleHandle, Vec<RuleHandle>>::new();

    for (handle, rule) in rules.iter() {
        let mut set = BTreeSet::new();
        for production in &rule.definition {
            if collect_prefix_rules(production, first, &mut set) {
                break;
            }
        }
        prefix_rules[handle] = set.into_iter().collect();
    }

    let mut visited = EntitySet::new();
    let mut stack = Vec::new();
    for (handle, _) in rules.iter() {
        find_prefix_cycles(handle, &prefix_rules, &mut visited, &mut stack, rules, err);
    }
}

/// Collects the rules which may be entered before any token is consumed, returns
/// whether the production always consumes a token.
fn collect_prefix_rules(production: &Production, first: &FirstSets, rules: &mut BTreeSet<RuleHandle>) -> bool {
    let sequence = |definition: &[Production], rules: &mut BTreeSet<RuleHandle>| {
        for p in definition {
            if collect_prefix_rules(p, first, rules) {
                return true;
            }
        }
        false
    };

    match production {
        Production::Terminal { .. } => true,
        Production::NonTerminal { target, .. } => match *target {
            Some(target) => {
                rules.insert(target);
                !first.is_nullable(target)
            }
            None => false,
        },
        Production::Alternation { alternatives, .. } => {
            let mut all_true = true;
            for alternative in alternatives {
                all_true &= sequence(&alternative.definition, rules);
            }
            all_true
        }
        Production::RepetitionMandatory { definition, .. }
        | Production::RepetitionMandatoryWithSeparator { definition, .. } => sequence(definition, rules),
        Production::Option { definition, .. }
        | Production::Repetition { definition, .. }
        | Production::RepetitionWithSeparator { definition, .. } => {
            sequence(definition, rules);
            false
        }
    }
}

fn find_prefix_cycles(
    handle: RuleHandle,

    prefix_rules: &SecondaryMap<RuleHandle, Vec<RuleHandle>>,
    visited: &mut EntitySet<RuleHandle>,
    stack: &mut Vec<RuleHandle>,

    rules: &Rules,
    err: &ErrorAccumulator,
) {
    if let Some(pos) = stack.iter().position(|&rule| rule == handle) {
        //      /pos
        // A -> B -> C -> D
        //      ↑________|
        let path = stack[pos..]
            .iter()
            .chain(std::iter::once(&handle))
            .map(|&r| rules[r].name.as_str())
            .collect::<Vec<_>>()
            .join(" --> ");
        let name = &rules[handle].name;
        err.error(
            DefinitionErrorKind::LeftRecursion,
            name,
            format!(
                "Left Recursion found in grammar.\nrule: <{name}> can be invoked from itself (directly or indirectly)\nwithout consuming any Tokens. The grammar path that causes this is: \n {path}\n To fix this refactor your grammar to remove the left recursion."
            ),
        );
        return;
    }

    if visited.contains(handle) {
        return;
    }
    visited.insert(handle);

    stack.push(handle);
    for &next in &prefix_rules[handle] {
        find_prefix_cycles(next, prefix_rules, visited, stack, rules, err);
    }
    stack.pop();
}
