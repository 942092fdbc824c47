use std::{collections::HashMap, fmt::Write, sync::Arc};

use cranelift_entity::PrimaryMap;
use llkit_lexer::{Token, Vocabulary};

use crate::{
    analysis::{Analysis, FirstSets},
    check::{check_lookahead, check_structure},
    config::ParserConfig,
    dsl::{Dsl, RuleBody, Step},
    error::{DefinitionError, DefinitionErrors, ErrorAccumulator, ParseError},
    gast::{RuleHandle, Rules},
    lookahead::{Decision, DecisionKey},
    parser::{ParseContext, ParseOutput},
    record::GrammarBuilder,
    resolve::{resolve, ResolveCx},
};

/// Rules in declaration order, not yet recorded.
pub struct GrammarDefinition<R> {
    vocabulary: Arc<Vocabulary>,
    rules: Vec<(String, RuleBody<R>)>,
}

impl<R: Default + 'static> GrammarDefinition<R> {
    pub fn new(vocabulary: Arc<Vocabulary>) -> Self {
        Self {
            vocabulary,
            rules: Vec::new(),
        }
    }

    /// The first rule is not special, any rule can be used to start a parse.
    pub fn rule(
        mut self,
        name: impl Into<String>,
        body: impl Fn(&mut dyn Dsl<R>) -> Step<R> + Send + Sync + 'static,
    ) -> Self {
        self.rules.push((name.into(), Arc::new(body)));
        self
    }

    pub fn vocabulary(&self) -> &Arc<Vocabulary> {
        &self.vocabulary
    }

    pub fn compile(self, config: &ParserConfig) -> Result<Grammar<R>, DefinitionErrors> {
        let err = ErrorAccumulator::new();

        let mut rules = Rules::new();
        let mut bodies = PrimaryMap::new();
        for (name, body) in &self.rules {
            let rule = GrammarBuilder::record(name, body, &err);
            let handle = rules.push(rule);
            let body_handle: RuleHandle = bodies.push(body.clone());
            debug_assert_eq!(handle, body_handle);
        }

        let cx = ResolveCx::new(&rules, &self.vocabulary, &err);
        resolve(&mut rules, &cx);
        let name_to_rule = cx.name_to_rule;

        if !err.is_empty() {
            return Err(DefinitionErrors(err.finish()));
        }

        let first = FirstSets::new(&rules);
        check_structure(&rules, &first, &self.vocabulary, &err);
        if !err.is_empty() {
            return Err(DefinitionErrors(err.finish()));
        }

        let analysis = Analysis::new(&rules, &first, &self.vocabulary, config.max_lookahead);
        check_lookahead(&rules, &first, &analysis, &self.vocabulary, &err);

        if err.has_fatal() || (config.strict && !err.is_empty()) {
            return Err(DefinitionErrors(err.finish()));
        }
        let errors = err.finish();
        for warning in &errors {
            log::warn!("{}: {}", warning.rule, warning.message);
        }

        Ok(Grammar {
            vocabulary: self.vocabulary,
            config: config.clone(),
            rules,
            bodies,
            name_to_rule,
            analysis,
            warnings: errors,
        })
    }
}

/// A compiled grammar, immutable and shareable between threads.
pub struct Grammar<R> {
    pub(crate) vocabulary: Arc<Vocabulary>,
    pub(crate) config: ParserConfig,
    pub(crate) rules: Rules,
    pub(crate) bodies: PrimaryMap<RuleHandle, RuleBody<R>>,
    pub(crate) name_to_rule: HashMap<String, RuleHandle>,
    pub(crate) analysis: Analysis,
    warnings: Vec<DefinitionError>,
}

impl<R: Default> Grammar<R> {
    pub fn parse(&self, rule: &str, tokens: &[Token]) -> Result<ParseOutput<R>, ParseError> {
        let Some(&handle) = self.name_to_rule.get(rule) else {
            return Err(ParseError::UnknownRule(rule.to_owned()));
        };
        let cx = ParseContext::new(self, tokens);
        Ok(cx.run(handle))
    }

    /// Runs the validator again over the compiled rules.
    pub fn validate(&self) -> Vec<DefinitionError> {
        let err = ErrorAccumulator::new();
        ResolveCx::new(&self.rules, &self.vocabulary, &err);
        let first = FirstSets::new(&self.rules);
        check_structure(&self.rules, &first, &self.vocabulary, &err);
        if err.is_empty() {
            check_lookahead(&self.rules, &first, &self.analysis, &self.vocabulary, &err);
        }
        err.finish()
    }
}

impl<R> Grammar<R> {
    pub fn vocabulary(&self) -> &Arc<Vocabulary> {
        &self.vocabulary
    }

    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    pub fn rules(&self) -> &Rules {
        &self.rules
    }

    pub fn rule_handle(&self, name: &str) -> Option<RuleHandle> {
        self.name_to_rule.get(name).copied()
    }

    pub fn analysis(&self) -> &Analysis {
        &self.analysis
    }

    pub fn decision(&self, key: &DecisionKey) -> Option<&Decision> {
        self.analysis.decision(key)
    }

    /// Ambiguities accepted outside of strict mode.
    pub fn warnings(&self) -> &[DefinitionError] {
        &self.warnings
    }

    pub fn display_rules(&self, buf: &mut dyn Write) -> std::fmt::Result {
        for (_, rule) in self.rules.iter() {
            rule.display(buf, &self.vocabulary)?;
        }
        Ok(())
    }

    pub fn display_decisions(&self, buf: &mut dyn Write) -> std::fmt::Result {
        for (key, decision) in &self.analysis.decisions {
            writeln!(
                buf,
                "{} {}{}",
                self.rules[key.rule].name,
                key.kind.method_name(),
                key.occurrence
            )?;
            decision.display(buf, &self.vocabulary);
        }
        Ok(())
    }
}
