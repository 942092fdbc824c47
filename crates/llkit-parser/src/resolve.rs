//! Resolve rule references recorded by name into handles. Rules share a single flat
//! namespace which must not overlap with token type names.

use std::collections::{hash_map::Entry, HashMap};

use llkit_lexer::Vocabulary;

use crate::{
    error::{DefinitionErrorKind, ErrorAccumulator},
    gast::{Production, RuleHandle, Rules},
};

pub struct ResolveCx<'a> {
    pub err: &'a ErrorAccumulator,
    pub name_to_rule: HashMap<String, RuleHandle>,
}

impl<'a> ResolveCx<'a> {
    pub fn new(rules: &Rules, vocabulary: &Vocabulary, err: &'a ErrorAccumulator) -> ResolveCx<'a> {
        let mut this = ResolveCx {
            err,
            name_to_rule: HashMap::new(),
        };
        this.populate(rules, vocabulary);
        this
    }

    fn populate(&mut self, rules: &Rules, vocabulary: &Vocabulary) {
        for (handle, rule) in rules.iter() {
            match self.name_to_rule.entry(rule.name.clone()) {
                Entry::Occupied(_) => self.err.error(
                    DefinitionErrorKind::DuplicateRule,
                    &rule.name,
                    format!("Duplicate definition, rule name: '{}'", rule.name),
                ),
                Entry::Vacant(v) => {
                    v.insert(handle);
                }
            }

            if vocabulary.lookup(&rule.name).is_some() {
                self.err.error(
                    DefinitionErrorKind::NameCollision,
                    &rule.name,
                    format!(
                        "Rule name '{}' is already used by a token type",
                        rule.name
                    ),
                );
            }
        }
    }
}

impl ResolveCx<'_> {
    fn report_unresolved(&self, name: &str, rule_name: &str) {
        self.err.error(
            DefinitionErrorKind::UnresolvedReference,
            rule_name,
            format!(
                "Invalid grammar, reference to a rule which is not defined: ->{name}<- inside top level rule: ->{rule_name}<-"
            ),
        );
    }
}

pub fn resolve(rules: &mut Rules, cx: &ResolveCx) {
    for (_, rule) in rules.iter_mut() {
        let rule_name = rule.name.as_str();
        for production in &mut rule.definition {
            production.visit_nodes_top_down_mut(|p| {
                if let Production::NonTerminal { name, target, .. } = p {
                    *target = cx.name_to_rule.get(name.as_str()).copied();
                    if target.is_none() {
                        cx.report_unresolved(name, rule_name);
                    }
                }
            });
        }
        for name in &rule.backtracks {
            if !cx.name_to_rule.contains_key(name.as_str()) {
                cx.report_unresolved(name, rule_name);
            }
        }
    }
}
