use llkit_lexer::{Token, TokenTypeId};

use crate::{
    analysis::{CallSite, TokenSet},
    config::NodeLocationTracking,
    cst::{CstElement, CstNode},
    dsl::{Alt, Body, Dsl, Interrupt, Step},
    error::{RecognitionError, RecognitionErrorKind},
    gast::{ProductionKind, RuleHandle},
    grammar::Grammar,
    lookahead::{Decision, DecisionKey},
};

#[derive(Debug)]
pub struct ParseOutput<R> {
    /// Absent when CST output is disabled.
    pub cst: Option<CstNode>,
    pub value: R,
    pub errors: Vec<RecognitionError>,
}

impl<R> ParseOutput<R> {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ParserPosition {
    position: usize,
    errors: usize,
    rule_stack: usize,
    cst_stack: usize,
}

/// State of a single parse, rule bodies see it as `&mut dyn Dsl<R>`.
pub struct ParseContext<'g, 't, R> {
    pub(crate) grammar: &'g Grammar<R>,
    pub(crate) tokens: &'t [Token],
    pub(crate) position: usize,
    eof: Token,
    pub(crate) errors: Vec<RecognitionError>,
    /// Invoked rules and the occurrence they were invoked with.
    pub(crate) rule_stack: Vec<(RuleHandle, u32)>,
    cst_stack: Vec<CstNode>,
    root: Option<CstNode>,
    backtracking: u32,
    terminated: bool,
}

impl<'g, 't, R: Default> ParseContext<'g, 't, R> {
    pub(crate) fn new(grammar: &'g Grammar<R>, tokens: &'t [Token]) -> Self {
        let end = tokens.last().map_or(0, |t| t.span.end());
        Self {
            grammar,
            tokens,
            position: 0,
            eof: Token::eof(end),
            errors: Vec::new(),
            rule_stack: Vec::new(),
            cst_stack: Vec::new(),
            root: None,
            backtracking: 0,
            terminated: false,
        }
    }

    pub(crate) fn run(mut self, rule: RuleHandle) -> ParseOutput<R> {
        log::trace!(
            "Parsing {} tokens from rule {}",
            self.tokens.len(),
            self.grammar.rules[rule].name
        );

        let value = self.invoke(rule, 0, None).unwrap_or_default();

        if !self.terminated && self.position < self.tokens.len() {
            let found = self.la(1).clone();
            let message = format!(
                "Redundant input, expecting EOF but found: {}",
                self.describe(&found)
            );
            self.record_error(RecognitionErrorKind::NotAllInputParsed, message);
        }

        ParseOutput {
            cst: self.root,
            value,
            errors: self.errors,
        }
    }

    pub fn save_position(&self) -> ParserPosition {
        ParserPosition {
            position: self.position,
            errors: self.errors.len(),
            rule_stack: self.rule_stack.len(),
            cst_stack: self.cst_stack.len(),
        }
    }

    pub fn restore_position(&mut self, state: ParserPosition) {
        self.position = state.position;
        self.errors.truncate(state.errors);
        self.rule_stack.truncate(state.rule_stack);
        self.cst_stack.truncate(state.cst_stack);
    }

    pub(crate) fn recovery_enabled(&self) -> bool {
        self.grammar.config.recovery && self.backtracking == 0
    }

    fn output_cst(&self) -> bool {
        self.grammar.config.output_cst
    }

    fn tracking(&self) -> NodeLocationTracking {
        self.grammar.config.position_tracking
    }

    pub(crate) fn remaining(&self) -> &'t [Token] {
        &self.tokens[self.position.min(self.tokens.len())..]
    }

    pub(crate) fn kind_at(&self, index: usize) -> TokenTypeId {
        self.tokens.get(index).map_or(TokenTypeId::EOF, |t| t.kind)
    }

    pub(crate) fn current_rule(&self) -> RuleHandle {
        let Some(&(rule, _)) = self.rule_stack.last() else {
            unreachable!("DSL method called outside of a rule");
        };
        rule
    }

    fn key(&self, kind: ProductionKind, occurrence: u32) -> DecisionKey {
        DecisionKey {
            rule: self.current_rule(),
            kind,
            occurrence,
        }
    }

    fn rule_handle(&self, name: &str) -> RuleHandle {
        match self.grammar.name_to_rule.get(name) {
            Some(&handle) => handle,
            None => panic!("Rule `{name}` is not part of the grammar"),
        }
    }

    pub(crate) fn describe(&self, token: &Token) -> String {
        if token.is_eof() {
            "end of input".to_owned()
        } else {
            format!("'{}'", token.image)
        }
    }

    pub(crate) fn record_error(
        &mut self,
        kind: RecognitionErrorKind,
        message: String,
    ) -> Interrupt {
        let grammar = self.grammar;
        let error = RecognitionError {
            kind,
            message,
            token: self.la(1).clone(),
            previous_token: self
                .position
                .checked_sub(1)
                .and_then(|i| self.tokens.get(i))
                .cloned(),
            resynced_tokens: Vec::new(),
            rule_stack: self
                .rule_stack
                .iter()
                .map(|&(rule, _)| grammar.rules[rule].name.clone())
                .collect(),
        };
        log::debug!("{:?} at {}: {}", kind, error.token.span, error.message);
        self.errors.push(error);
        Interrupt {
            error: self.errors.len() - 1,
        }
    }

    fn add_token(&mut self, label: Option<&str>, expected: TokenTypeId, token: Token) {
        if !self.output_cst() {
            return;
        }
        let grammar = self.grammar;
        let tracking = self.tracking();
        let label = label.unwrap_or_else(|| expected.name(&grammar.vocabulary));
        if let Some(node) = self.cst_stack.last_mut() {
            node.add(label, CstElement::Token(token), tracking);
        }
    }

    fn lookahead_enters(&self, decision: Option<&Decision>) -> bool {
        decision
            .and_then(|d| d.choose(self.remaining(), &self.grammar.vocabulary, None))
            .is_some()
    }

    /// Whether another iteration of a repetition starts here.
    pub(crate) fn repetition_continues(
        &self,
        decision: Option<&Decision>,
        separator: Option<TokenTypeId>,
    ) -> bool {
        match separator {
            Some(separator) => self
                .grammar
                .vocabulary
                .matches(self.kind_at(self.position), separator),
            None => self.lookahead_enters(decision),
        }
    }

    fn invoke(&mut self, rule: RuleHandle, occurrence: u32, label: Option<&str>) -> Step<R> {
        let grammar = self.grammar;
        self.rule_stack.push((rule, occurrence));
        if self.output_cst() {
            self.cst_stack.push(CstNode::new(grammar.rules[rule].name.as_str()));
        }

        let body = &grammar.bodies[rule];
        let result = match body(self) {
            Ok(value) => Ok(value),
            Err(interrupt) => self.recover_rule(interrupt),
        };

        if self.output_cst() {
            if let Some(node) = self.cst_stack.pop() {
                let tracking = self.tracking();
                let label = label.unwrap_or(&grammar.rules[rule].name);
                match self.cst_stack.last_mut() {
                    Some(parent) => parent.add(label, CstElement::Node(node), tracking),
                    None => self.root = Some(node),
                }
            }
        }
        self.rule_stack.pop();

        result
    }

    fn mark_recovered(&mut self) {
        if let Some(node) = self.cst_stack.last_mut() {
            node.recovered = true;
        }
    }

    fn recover_rule(&mut self, interrupt: Interrupt) -> Step<R> {
        self.mark_recovered();
        let top = self.rule_stack.len() == 1;

        if self.recovery_enabled() {
            let grammar = self.grammar;
            let mut index = self.position;
            loop {
                let kind = self.kind_at(index);
                if self.in_current_follow(kind) {
                    let skipped = self.tokens[self.position..index].to_vec();
                    log::trace!(
                        "Resynced rule {} by skipping {} tokens",
                        grammar.rules[self.current_rule()].name,
                        skipped.len()
                    );
                    self.errors[interrupt.error].resynced_tokens.extend(skipped);
                    self.position = index;
                    return Ok(R::default());
                }
                if kind == TokenTypeId::EOF || self.in_enclosing_follows(kind) {
                    return Err(interrupt);
                }
                index += 1;
            }
        }

        if top && self.backtracking == 0 {
            self.terminated = true;
            return Ok(R::default());
        }
        Err(interrupt)
    }

    fn call_follow(&self, depth: usize) -> Option<&'g TokenSet> {
        let grammar = self.grammar;
        let (callee, occurrence) = self.rule_stack[depth];
        let (caller, _) = self.rule_stack[depth.checked_sub(1)?];
        grammar.analysis.call_follows.get(&CallSite {
            caller,
            callee,
            occurrence,
        })
    }

    /// Tokens which may follow the innermost rule invocation, EOF for the start rule.
    pub(crate) fn in_current_follow(&self, kind: TokenTypeId) -> bool {
        let depth = self.rule_stack.len() - 1;
        if depth == 0 {
            return kind == TokenTypeId::EOF;
        }
        self.call_follow(depth).is_some_and(|set| set.contains(kind))
    }

    /// Tokens which may follow any invocation on the rule stack.
    pub(crate) fn in_enclosing_follows(&self, kind: TokenTypeId) -> bool {
        kind == TokenTypeId::EOF
            || (1..self.rule_stack.len())
                .any(|depth| self.call_follow(depth).is_some_and(|set| set.contains(kind)))
    }

    fn single_token_recovery(
        &mut self,
        expected: TokenTypeId,
        occurrence: u32,
        interrupt: Interrupt,
    ) -> Option<Token> {
        let grammar = self.grammar;
        let rule = self.current_rule();
        let next = self.la(1).clone();

        if let Some(follow) = grammar.analysis.terminal_follows.get(&(rule, expected, occurrence)) {
            if follow.contains(next.kind) {
                log::trace!("Inserting {} before {:?}", expected.name(&grammar.vocabulary), next);
                return Some(Token::inserted(expected, &next));
            }
        }

        if !next.is_eof() && grammar.vocabulary.matches(self.kind_at(self.position + 1), expected) {
            log::trace!("Deleting {:?}", next);
            self.errors[interrupt.error].resynced_tokens.push(next);
            self.position += 1;
            let token = self.la(1).clone();
            self.position += 1;
            return Some(token);
        }

        None
    }

    fn repetition(
        &mut self,
        kind: ProductionKind,
        occurrence: u32,
        separator: Option<TokenTypeId>,
        body: Body<'_, R>,
    ) -> Step<()> {
        let grammar = self.grammar;
        let key = self.key(kind, occurrence);
        let decision = grammar.decision(&key);
        let mandatory = matches!(kind, ProductionKind::AtLeastOne | ProductionKind::AtLeastOneSep);

        let mut first = true;
        loop {
            if first {
                if !self.lookahead_enters(decision) {
                    if mandatory {
                        return Err(self.early_exit(key, decision));
                    }
                    break;
                }
            } else if !self.repetition_continues(decision, separator) {
                if self.skip_to_next_iteration(key, decision, separator) {
                    continue;
                }
                break;
            } else if let Some(separator) = separator {
                let token = self.la(1).clone();
                self.position += 1;
                self.add_token(None, separator, token);
            }
            first = false;

            let before = self.position;
            if let Err(interrupt) = body(self) {
                if !self.resume_repetition(key, decision, separator, interrupt)? {
                    break;
                }
            }
            if self.position == before {
                break;
            }
        }

        Ok(())
    }

    fn early_exit(&mut self, key: DecisionKey, decision: Option<&Decision>) -> Interrupt {
        let found = self.la(1).clone();
        let message = format!(
            "Expecting at least one iteration of {}{} which starts with one of these possible token sequences:\n{}but found: {}",
            key.kind.method_name(),
            key.occurrence,
            self.expected_paths(decision),
            self.describe(&found)
        );
        self.record_error(RecognitionErrorKind::EarlyExit, message)
    }

    pub(crate) fn expected_paths(&self, decision: Option<&Decision>) -> String {
        let mut out = String::new();
        if let Some(decision) = decision {
            decision.display(&mut out, &self.grammar.vocabulary);
        }
        out
    }
}

impl<R: Default> Dsl<R> for ParseContext<'_, '_, R> {
    fn is_recording(&self) -> bool {
        false
    }

    fn la(&self, distance: usize) -> &Token {
        let index = self.position + distance.max(1) - 1;
        self.tokens.get(index).unwrap_or(&self.eof)
    }

    fn consume_labeled(
        &mut self,
        occurrence: u32,
        token: TokenTypeId,
        label: Option<&str>,
    ) -> Step<Token> {
        let grammar = self.grammar;
        let next = self.la(1);
        if grammar.vocabulary.matches(next.kind, token) {
            let next = next.clone();
            if !next.is_eof() {
                self.position += 1;
            }
            self.add_token(label, token, next.clone());
            return Ok(next);
        }

        let found = next.clone();
        let message = format!(
            "Expecting token of type {} but found {}",
            token.name(&grammar.vocabulary),
            self.describe(&found)
        );
        let interrupt = self.record_error(RecognitionErrorKind::MismatchedToken, message);

        if self.recovery_enabled() {
            if let Some(recovered) = self.single_token_recovery(token, occurrence, interrupt) {
                self.mark_recovered();
                self.add_token(label, token, recovered.clone());
                return Ok(recovered);
            }
        }

        Err(interrupt)
    }

    fn subrule_labeled(&mut self, occurrence: u32, rule: &str, label: Option<&str>) -> Step<R> {
        let handle = self.rule_handle(rule);
        self.invoke(handle, occurrence, label)
    }

    fn option(&mut self, occurrence: u32, body: Body<'_, R>) -> Step<bool> {
        let grammar = self.grammar;
        let key = self.key(ProductionKind::Option, occurrence);
        if !self.lookahead_enters(grammar.decision(&key)) {
            return Ok(false);
        }
        body(self)?;
        Ok(true)
    }

    fn many(&mut self, occurrence: u32, body: Body<'_, R>) -> Step<()> {
        self.repetition(ProductionKind::Many, occurrence, None, body)
    }

    fn at_least_one(&mut self, occurrence: u32, body: Body<'_, R>) -> Step<()> {
        self.repetition(ProductionKind::AtLeastOne, occurrence, None, body)
    }

    fn many_sep(
        &mut self,
        occurrence: u32,
        separator: TokenTypeId,
        body: Body<'_, R>,
    ) -> Step<()> {
        self.repetition(ProductionKind::ManySep, occurrence, Some(separator), body)
    }

    fn at_least_one_sep(
        &mut self,
        occurrence: u32,
        separator: TokenTypeId,
        body: Body<'_, R>,
    ) -> Step<()> {
        self.repetition(ProductionKind::AtLeastOneSep, occurrence, Some(separator), body)
    }

    fn or(&mut self, occurrence: u32, alternatives: &mut [Alt<'_, R>]) -> Step<R> {
        let grammar = self.grammar;
        let key = self.key(ProductionKind::Or, occurrence);
        let decision = grammar.decision(&key);

        let mut enabled = None;
        if alternatives.iter().any(|a| a.gate.is_some()) {
            let mut mask = Vec::with_capacity(alternatives.len());
            for alternative in alternatives.iter() {
                mask.push(match alternative.gate {
                    Some(gate) => gate(self),
                    None => true,
                });
            }
            enabled = Some(mask);
        }

        let chosen = decision.and_then(|d| {
            d.choose(self.remaining(), &grammar.vocabulary, enabled.as_deref())
        });
        match chosen {
            Some(index) if index < alternatives.len() => (alternatives[index].body)(self),
            _ => {
                let found = self.la(1).clone();
                let message = format!(
                    "Expecting one of these possible token sequences:\n{}but found: {}",
                    self.expected_paths(decision),
                    self.describe(&found)
                );
                Err(self.record_error(RecognitionErrorKind::NoViableAlternative, message))
            }
        }
    }

    fn backtrack(&mut self, rule: &str) -> bool {
        let Some(&handle) = self.grammar.name_to_rule.get(rule) else {
            log::warn!("Backtracking into unknown rule `{rule}`");
            return false;
        };
        let state = self.save_position();

        self.backtracking += 1;
        // the trial attaches its node to a scratch parent which is discarded below
        if self.output_cst() {
            self.cst_stack.push(CstNode::new(""));
        }
        let succeeded = self.invoke(handle, 0, None).is_ok() && self.errors.len() == state.errors;
        self.backtracking -= 1;

        self.restore_position(state);
        succeeded
    }
}
