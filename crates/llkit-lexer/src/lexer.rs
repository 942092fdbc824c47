use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use cranelift_entity::{EntitySet, SecondaryMap};
use serde::Serialize;

use crate::{
    config::{LexerConfig, PositionTracking},
    dispatch::DispatchTable,
    error::{LexerDefinitionError, LexicalError, LexicalErrorKind, UnknownMode},
    pattern::{self, Analysis, CompiledPattern, FirstChars, PatternError},
    span::{LineCol, Span},
    token::{Group, Token, TokenTypeId, Vocabulary},
};

/// Ordered token types of every lexer mode.
#[derive(Clone, Debug)]
pub struct LexerDefinition {
    modes: Vec<(String, Vec<TokenTypeId>)>,
    default_mode: String,
}

impl LexerDefinition {
    pub const DEFAULT_MODE: &'static str = "default";

    pub fn single(types: impl IntoIterator<Item = TokenTypeId>) -> Self {
        Self::multi_mode(Self::DEFAULT_MODE).mode(Self::DEFAULT_MODE, types)
    }

    pub fn multi_mode(default_mode: impl Into<String>) -> Self {
        Self {
            modes: Vec::new(),
            default_mode: default_mode.into(),
        }
    }

    pub fn mode(mut self, name: impl Into<String>, types: impl IntoIterator<Item = TokenTypeId>) -> Self {
        self.modes.push((name.into(), types.into_iter().collect()));
        self
    }
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct LexResult {
    pub tokens: Vec<Token>,
    /// Tokens of named groups, in input order.
    pub groups: HashMap<String, Vec<Token>>,
    pub errors: Vec<LexicalError>,
}

struct Mode {
    name: String,
    patterns: Vec<TokenTypeId>,
    dispatch: DispatchTable,
}

pub struct Lexer {
    vocabulary: Arc<Vocabulary>,
    config: LexerConfig,
    modes: Vec<Mode>,
    mode_names: HashMap<String, usize>,
    default_mode: usize,
    patterns: SecondaryMap<TokenTypeId, Option<CompiledPattern>>,
    push_mode: SecondaryMap<TokenTypeId, Option<u32>>,
    line_breaks: EntitySet<TokenTypeId>,
}

impl Lexer {
    pub fn new(
        vocabulary: Arc<Vocabulary>,
        definition: &LexerDefinition,
        config: LexerConfig,
    ) -> Result<Lexer, Vec<LexerDefinitionError>> {
        let mut errors = Vec::new();

        for &duplicate in vocabulary.duplicates() {
            errors.push(LexerDefinitionError::DuplicateName {
                token: duplicate.name(&vocabulary).to_owned(),
            });
        }

        for &handle in vocabulary.unknown_references() {
            errors.push(LexerDefinitionError::UnknownTokenType {
                token: handle.name(&vocabulary).to_owned(),
            });
        }

        let mut mode_names = HashMap::new();
        for (index, (name, _)) in definition.modes.iter().enumerate() {
            mode_names.entry(name.clone()).or_insert(index);
        }

        let default_mode = match mode_names.get(&definition.default_mode) {
            Some(&index) => index,
            None => {
                errors.push(LexerDefinitionError::UnknownDefaultMode {
                    mode: definition.default_mode.clone(),
                });
                0
            }
        };

        let mut used = Vec::new();
        let mut seen = HashSet::new();
        for (mode, types) in &definition.modes {
            for &handle in types {
                if seen.insert(handle) {
                    used.push(handle);
                }
                for &alternative in &vocabulary.get(handle).longer_alternatives {
                    if !types.contains(&alternative) {
                        errors.push(LexerDefinitionError::LongerAlternativeNotInMode {
                            token: handle.name(&vocabulary).to_owned(),
                            alternative: alternative.name(&vocabulary).to_owned(),
                            mode: mode.clone(),
                        });
                    }
                }
            }
        }

        let mut patterns = SecondaryMap::new();
        let mut push_mode = SecondaryMap::new();
        let mut line_breaks = EntitySet::new();
        let mut analyses: HashMap<TokenTypeId, Analysis> = HashMap::new();

        for handle in used {
            let token = vocabulary.get(handle);
            let name = || token.name.clone();

            match pattern::compile(&token.pattern, &config.line_terminators) {
                Ok((compiled, analysis)) => {
                    if analysis.nullable {
                        errors.push(LexerDefinitionError::EmptyMatch { token: name() });
                    }
                    if analysis.first == FirstChars::Any {
                        if config.ensure_optimizations {
                            errors.push(LexerDefinitionError::Unoptimized { token: name() });
                        } else {
                            log::warn!(
                                "Token type `{}` is tried at every position, its first characters are unknown",
                                token.name
                            );
                        }
                    }
                    if token.line_breaks.unwrap_or(analysis.line_breaks) {
                        line_breaks.insert(handle);
                    }
                    patterns[handle] = Some(compiled);
                    analyses.insert(handle, analysis);
                }
                Err(PatternError::Regex(message)) => {
                    errors.push(LexerDefinitionError::InvalidPattern {
                        token: name(),
                        message,
                    });
                }
                Err(PatternError::NotMatchable) => {
                    errors.push(LexerDefinitionError::NotMatchable { token: name() });
                }
            }

            if let Some(target) = &token.push_mode {
                match mode_names.get(target) {
                    Some(&index) => push_mode[handle] = Some(index as u32),
                    None => errors.push(LexerDefinitionError::UnknownPushMode {
                        token: name(),
                        target: target.clone(),
                    }),
                }
            }
        }

        if !errors.is_empty() {
            return Err(errors);
        }

        let modes = definition
            .modes
            .iter()
            .map(|(name, types)| {
                let dispatch = DispatchTable::build(
                    types
                        .iter()
                        .filter_map(|handle| Some((*handle, &analyses.get(handle)?.first))),
                );
                Mode {
                    name: name.clone(),
                    patterns: types.clone(),
                    dispatch,
                }
            })
            .collect::<Vec<_>>();

        log::debug!(
            "Compiled lexer: {} modes, {} token types",
            modes.len(),
            analyses.len()
        );

        Ok(Lexer {
            vocabulary,
            config,
            modes,
            mode_names,
            default_mode,
            patterns,
            push_mode,
            line_breaks,
        })
    }

    pub fn vocabulary(&self) -> &Arc<Vocabulary> {
        &self.vocabulary
    }

    pub fn dispatch_table(&self, mode: &str) -> Option<&DispatchTable> {
        let index = *self.mode_names.get(mode)?;
        Some(&self.modes[index].dispatch)
    }

    pub fn tokenize(&self, text: &str) -> LexResult {
        self.run(text, self.default_mode)
    }

    pub fn tokenize_in_mode(&self, text: &str, mode: &str) -> Result<LexResult, UnknownMode> {
        match self.mode_names.get(mode) {
            Some(&index) => Ok(self.run(text, index)),
            None => Err(UnknownMode(mode.to_owned())),
        }
    }

    fn run(&self, text: &str, start_mode: usize) -> LexResult {
        let mut result = LexResult::default();
        if let Some(error) = input_too_large(text.len()) {
            result.errors.push(error);
            return result;
        }

        let mut cursor = Cursor::new(text, &self.config);
        let mut mode_stack = vec![start_mode];

        while let Some(c) = cursor.peek() {
            let mode = &self.modes[*mode_stack.last().unwrap()];

            let Some((kind, len)) = self.match_candidates(text, cursor.offset, mode.dispatch.candidates(c))
            else {
                if self.recover(&mut cursor, mode, &mut result) {
                    continue;
                }
                break;
            };

            let token = cursor.finish_token(kind, len, self.line_breaks.contains(kind));
            let token_type = self.vocabulary.get(kind);

            if token_type.pop_mode {
                if mode_stack.len() > 1 {
                    mode_stack.pop();
                } else {
                    result.errors.push(LexicalError {
                        kind: LexicalErrorKind::EmptyModeStack,
                        span: token.span,
                        start: token.start,
                        message: format!(
                            "Unable to pop lexer mode after token `{}`, the mode stack is empty",
                            token_type.name
                        ),
                    });
                }
            }
            if let Some(push) = self.push_mode[kind] {
                mode_stack.push(push as usize);
                log::trace!("Pushed lexer mode `{}`", self.modes[push as usize].name);
            }

            match &token_type.group {
                Group::Default => result.tokens.push(token),
                Group::Skip => {}
                Group::Named(group) => result.groups.entry(group.clone()).or_default().push(token),
            }
        }

        result
    }

    fn try_match(&self, handle: TokenTypeId, text: &str, offset: usize) -> Option<usize> {
        let pattern = self.patterns[handle].as_ref()?;
        pattern.match_at(text, offset).filter(|&len| len > 0)
    }

    /// First declared candidate wins, unless one of its longer alternatives matches more.
    fn match_candidates(
        &self,
        text: &str,
        offset: usize,
        candidates: &[TokenTypeId],
    ) -> Option<(TokenTypeId, usize)> {
        for &candidate in candidates {
            let Some(len) = self.try_match(candidate, text, offset) else {
                continue;
            };
            for &alternative in &self.vocabulary.get(candidate).longer_alternatives {
                if let Some(longer) = self.try_match(alternative, text, offset) {
                    if longer > len {
                        return Some((alternative, longer));
                    }
                }
            }
            return Some((candidate, len));
        }
        None
    }

    /// Skips characters until some pattern of `mode` matches, returns whether lexing
    /// should continue.
    fn recover(&self, cursor: &mut Cursor, mode: &Mode, result: &mut LexResult) -> bool {
        let start_offset = cursor.offset;
        let start = cursor.position();

        cursor.skip_char();
        if self.config.recovery {
            while cursor.peek().is_some() {
                let offset = cursor.offset;
                if mode
                    .patterns
                    .iter()
                    .any(|&handle| self.try_match(handle, cursor.text, offset).is_some())
                {
                    break;
                }
                cursor.skip_char();
            }
        }

        let span = Span::new(start_offset as u32, cursor.offset as u32);
        let skipped = span.as_str(cursor.text);
        result.errors.push(LexicalError {
            kind: LexicalErrorKind::UnexpectedCharacters,
            span,
            start,
            message: format!(
                "Unexpected character(s) {skipped:?} at offset {start_offset}, skipped {} character(s)",
                skipped.chars().count()
            ),
        });

        self.config.recovery
    }
}

fn input_too_large(len: usize) -> Option<LexicalError> {
    (len > u32::MAX as usize).then(|| LexicalError {
        kind: LexicalErrorKind::InputTooLarge,
        span: Span::at(0),
        start: None,
        message: format!(
            "Input of {len} bytes is too large, at most {} bytes can be tokenized",
            u32::MAX
        ),
    })
}

struct Cursor<'a> {
    text: &'a str,
    offset: usize,
    line: u32,
    column: u32,
    tracking: PositionTracking,
    terminators: &'a [char],
}

impl<'a> Cursor<'a> {
    fn new(text: &'a str, config: &'a LexerConfig) -> Cursor<'a> {
        Cursor {
            text,
            offset: 0,
            line: 1,
            column: 1,
            tracking: config.position_tracking,
            terminators: &config.line_terminators,
        }
    }

    fn peek(&self) -> Option<char> {
        self.text[self.offset..].chars().next()
    }

    fn position(&self) -> Option<LineCol> {
        match self.tracking {
            PositionTracking::OffsetOnly => None,
            _ => Some(LineCol {
                line: self.line,
                column: self.column,
            }),
        }
    }

    /// Moves over `len` bytes, returns the position of the last character.
    fn advance(&mut self, len: usize, line_breaks: bool) -> Option<LineCol> {
        let image = &self.text[self.offset..self.offset + len];
        self.offset += len;

        if self.tracking == PositionTracking::OffsetOnly {
            return None;
        }

        if !line_breaks {
            let count = image.chars().count() as u32;
            self.column += count;
            return Some(LineCol {
                line: self.line,
                column: self.column - 1,
            });
        }

        let mut last = self.position();
        let mut chars = image.chars().peekable();
        while let Some(c) = chars.next() {
            last = self.position();
            if self.terminators.contains(&c) {
                if c == '\r' && chars.peek() == Some(&'\n') {
                    chars.next();
                    last = Some(LineCol {
                        line: self.line,
                        column: self.column + 1,
                    });
                }
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
        last
    }

    fn skip_char(&mut self) {
        if let Some(c) = self.peek() {
            self.advance(c.len_utf8(), true);
        }
    }

    fn finish_token(&mut self, kind: TokenTypeId, len: usize, line_breaks: bool) -> Token {
        let start = self.position();
        let span = Span::new(self.offset as u32, (self.offset + len) as u32);
        let image = span.as_str(self.text).to_owned();
        let end = self.advance(len, line_breaks);

        Token {
            kind,
            image,
            span,
            start,
            end: match self.tracking {
                PositionTracking::Full => end,
                _ => None,
            },
            inserted: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::{CustomPattern, Pattern, TokenType};

    fn kinds(result: &LexResult) -> Vec<TokenTypeId> {
        result.tokens.iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_longer_alternative() {
        let mut vocabulary = Vocabulary::new();
        let ident = vocabulary.define(TokenType::regex("IDENT", "[a-z]+"));
        let keyword = vocabulary.define(TokenType::literal("IF", "if").longer_alternative(ident));
        let ws = vocabulary.define(TokenType::regex("WS", " +").skip());

        let definition = LexerDefinition::single([keyword, ident, ws]);
        let lexer = Lexer::new(Arc::new(vocabulary), &definition, LexerConfig::default()).unwrap();

        let result = lexer.tokenize("ifx if");
        assert!(result.errors.is_empty());
        assert_eq!(kinds(&result), vec![ident, keyword]);
        assert_eq!(result.tokens[0].image, "ifx");
    }

    #[test]
    fn test_declaration_order_wins() {
        let mut vocabulary = Vocabulary::new();
        let short = vocabulary.define(TokenType::literal("EQ", "="));
        let long = vocabulary.define(TokenType::literal("EQEQ", "=="));

        let definition = LexerDefinition::single([short, long]);
        let lexer = Lexer::new(Arc::new(vocabulary), &definition, LexerConfig::default()).unwrap();

        assert_eq!(kinds(&lexer.tokenize("==")), vec![short, short]);
    }

    #[test]
    fn test_error_recovery() {
        let mut vocabulary = Vocabulary::new();
        let number = vocabulary.define(TokenType::regex("NUMBER", "[0-9]+"));
        let ws = vocabulary.define(TokenType::regex("WS", r"\s+").skip());

        let definition = LexerDefinition::single([number, ws]);
        let lexer = Lexer::new(Arc::new(vocabulary), &definition, LexerConfig::default()).unwrap();

        let result = lexer.tokenize("12 ab\n%3 4");
        assert_eq!(kinds(&result), vec![number, number, number]);
        assert_eq!(result.errors.len(), 2);
        assert_eq!(result.errors[0].span, Span::new(3, 5));
        assert_eq!(result.errors[1].span, Span::new(6, 7));
        assert_eq!(result.errors[1].start, Some(LineCol { line: 2, column: 1 }));
        assert_eq!(result.tokens[1].start, Some(LineCol { line: 2, column: 2 }));
    }

    #[test]
    fn test_recovery_disabled() {
        let mut vocabulary = Vocabulary::new();
        let number = vocabulary.define(TokenType::regex("NUMBER", "[0-9]+"));

        let definition = LexerDefinition::single([number]);
        let config = LexerConfig {
            recovery: false,
            ..LexerConfig::default()
        };
        let lexer = Lexer::new(Arc::new(vocabulary), &definition, config).unwrap();

        let result = lexer.tokenize("1ab2");
        assert_eq!(kinds(&result), vec![number]);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].span, Span::new(1, 2));
    }

    #[test]
    fn test_modes() {
        let mut vocabulary = Vocabulary::new();
        let quote_open = vocabulary.define(TokenType::literal("OPEN", "\"").push_mode("string"));
        let quote_close = vocabulary.define(TokenType::literal("CLOSE", "\"").pop_mode());
        let text = vocabulary.define(TokenType::regex("TEXT", "[^\"]+"));
        let word = vocabulary.define(TokenType::regex("WORD", "[a-z]+"));
        let ws = vocabulary.define(TokenType::regex("WS", " +").skip());

        let definition = LexerDefinition::multi_mode("outside")
            .mode("outside", [quote_open, word, ws])
            .mode("string", [quote_close, text]);
        let lexer = Lexer::new(Arc::new(vocabulary), &definition, LexerConfig::default()).unwrap();

        let result = lexer.tokenize("ab \"x y\" cd");
        assert!(result.errors.is_empty());
        assert_eq!(kinds(&result), vec![word, quote_open, text, quote_close, word]);
        assert_eq!(result.tokens[2].image, "x y");

        let result = lexer.tokenize_in_mode("x\"", "string").unwrap();
        assert_eq!(kinds(&result), vec![text, quote_close]);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].kind, LexicalErrorKind::EmptyModeStack);

        assert!(lexer.tokenize_in_mode("", "missing").is_err());
    }

    #[test]
    fn test_groups_and_positions() {
        let mut vocabulary = Vocabulary::new();
        let word = vocabulary.define(TokenType::regex("WORD", "[a-z]+"));
        let comment = vocabulary
            .define(TokenType::regex("COMMENT", "#[^\r\n]*").group(Group::Named("comments".into())));
        let nl = vocabulary.define(TokenType::regex("NL", "\r?\n").skip());

        let definition = LexerDefinition::single([word, comment, nl]);
        let lexer = Lexer::new(Arc::new(vocabulary), &definition, LexerConfig::default()).unwrap();

        let result = lexer.tokenize("ab#c\r\nxyz");
        assert_eq!(kinds(&result), vec![word, word]);
        assert_eq!(result.groups["comments"][0].image, "#c");

        let last = &result.tokens[1];
        assert_eq!(last.start, Some(LineCol { line: 2, column: 1 }));
        assert_eq!(last.end, Some(LineCol { line: 2, column: 3 }));
        assert_eq!(last.span, Span::new(6, 9));
    }

    #[test]
    fn test_custom_pattern() {
        let mut vocabulary = Vocabulary::new();
        let digits = CustomPattern::new(|text: &str, offset: usize| {
            let len = text[offset..].bytes().take_while(u8::is_ascii_digit).count();
            (len > 0).then_some(len)
        })
        .with_start_chars('0'..='9');
        let number = vocabulary.define(TokenType::new("NUMBER", Pattern::Custom(digits)));
        let plus = vocabulary.define(TokenType::literal("PLUS", "+"));

        let definition = LexerDefinition::single([number, plus]);
        let lexer = Lexer::new(Arc::new(vocabulary), &definition, LexerConfig::default()).unwrap();

        assert_eq!(kinds(&lexer.tokenize("12+3")), vec![number, plus, number]);
    }

    #[test]
    fn test_custom_pattern_bad_length() {
        let mut vocabulary = Vocabulary::new();
        // one byte into a two byte character, then past the end of the input
        let split = CustomPattern::new(|text: &str, offset: usize| {
            Some(if offset == 0 { 1 } else { text.len() + 1 })
        })
        .with_start_chars(['é', 'x']);
        let broken = vocabulary.define(TokenType::new("BROKEN", Pattern::Custom(split)));
        let x = vocabulary.define(TokenType::literal("X", "x"));

        let definition = LexerDefinition::single([broken, x]);
        let lexer = Lexer::new(Arc::new(vocabulary), &definition, LexerConfig::default()).unwrap();

        let result = lexer.tokenize("éx");
        assert_eq!(kinds(&result), vec![x]);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].span, Span::new(0, 2));
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn test_input_too_large() {
        assert!(input_too_large(u32::MAX as usize).is_none());
        let error = input_too_large(u32::MAX as usize + 1).unwrap();
        assert_eq!(error.kind, LexicalErrorKind::InputTooLarge);
    }

    #[test]
    fn test_definition_errors() {
        let mut vocabulary = Vocabulary::new();
        let empty = vocabulary.define(TokenType::regex("EMPTY", "a*"));
        let broken = vocabulary.define(TokenType::regex("BROKEN", "(a"));
        let category = vocabulary.define(TokenType::category("CATEGORY"));
        let push = vocabulary.define(TokenType::literal("PUSH", "<").push_mode("nowhere"));

        let definition = LexerDefinition::single([empty, broken, category, push]);
        let Err(errors) = Lexer::new(Arc::new(vocabulary), &definition, LexerConfig::default())
        else {
            panic!("Expected definition errors");
        };

        assert_eq!(errors.len(), 4);
        assert!(matches!(errors[0], LexerDefinitionError::EmptyMatch { .. }));
        assert!(matches!(errors[1], LexerDefinitionError::InvalidPattern { .. }));
        assert!(matches!(errors[2], LexerDefinitionError::NotMatchable { .. }));
        assert!(matches!(errors[3], LexerDefinitionError::UnknownPushMode { .. }));
    }

    #[test]
    fn test_ensure_optimizations() {
        let mut vocabulary = Vocabulary::new();
        let custom = vocabulary.define(TokenType::new(
            "ANY",
            Pattern::Custom(CustomPattern::new(|_: &str, _: usize| Some(1))),
        ));

        let definition = LexerDefinition::single([custom]);
        let config = LexerConfig {
            ensure_optimizations: true,
            ..LexerConfig::default()
        };
        let Err(errors) = Lexer::new(Arc::new(vocabulary), &definition, config) else {
            panic!("Expected definition errors");
        };
        assert!(matches!(errors[0], LexerDefinitionError::Unoptimized { .. }));
    }
}
