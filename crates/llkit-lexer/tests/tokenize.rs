use std::sync::Arc;

use llkit_lexer::{
    Lexer, LexerConfig, LexerDefinition, LexerDefinitionError, TokenType, TokenTypeId, Vocabulary,
};
use proptest::prelude::*;

const WORDS: &[(&str, &str)] = &[
    ("LBRACE", "{"),
    ("RBRACE", "}"),
    ("COLON", ":"),
    ("COMMA", ","),
    ("TRUE", "true"),
    ("FALSE", "false"),
    ("NULL", "null"),
    ("ARROW", "->"),
];

fn literal_lexer() -> (Lexer, Vec<TokenTypeId>) {
    let mut vocabulary = Vocabulary::new();
    let types = WORDS
        .iter()
        .map(|(name, literal)| vocabulary.define(TokenType::literal(*name, *literal)))
        .collect::<Vec<_>>();

    let definition = LexerDefinition::single(types.iter().copied());
    let lexer = Lexer::new(Arc::new(vocabulary), &definition, LexerConfig::default()).unwrap();
    (lexer, types)
}

proptest! {
    #[test]
    fn test_concatenated_images(indices in proptest::collection::vec(0..WORDS.len(), 0..64)) {
        let (lexer, types) = literal_lexer();
        let text = indices.iter().map(|&i| WORDS[i].1).collect::<String>();

        let result = lexer.tokenize(&text);
        prop_assert!(result.errors.is_empty());
        prop_assert_eq!(result.tokens.len(), indices.len());

        let mut offset = 0;
        for (token, &index) in result.tokens.iter().zip(&indices) {
            prop_assert_eq!(token.kind, types[index]);
            prop_assert_eq!(token.span.start(), offset);
            offset = token.span.end();
        }
        prop_assert_eq!(offset as usize, text.len());
    }

    #[test]
    fn test_never_fails(text in "\\PC{0,40}") {
        let (lexer, _) = literal_lexer();
        let result = lexer.tokenize(&text);

        let covered = result.tokens.iter().map(|t| t.span.len()).sum::<u32>()
            + result.errors.iter().map(|e| e.span.len()).sum::<u32>();
        prop_assert_eq!(covered as usize, text.len());
    }
}

#[test]
fn test_deterministic_dispatch() {
    let (a, _) = literal_lexer();
    let (b, _) = literal_lexer();
    assert_eq!(
        a.dispatch_table(LexerDefinition::DEFAULT_MODE),
        b.dispatch_table(LexerDefinition::DEFAULT_MODE)
    );
}

#[test]
fn test_serialize_tokens() {
    let (lexer, _) = literal_lexer();
    let result = lexer.tokenize("{}");
    let json = serde_json::to_value(&result.tokens).unwrap();
    assert_eq!(json[0]["image"], "{");
    assert_eq!(json[1]["start"]["column"], 2);
}

#[test]
fn test_longer_alternative_outside_mode() {
    let mut vocabulary = Vocabulary::new();
    let ident = vocabulary.define(TokenType::regex("IDENT", "[a-z]+"));
    let keyword = vocabulary.define(TokenType::literal("IF", "if").longer_alternative(ident));

    let definition = LexerDefinition::multi_mode("keywords")
        .mode("keywords", [keyword])
        .mode("names", [keyword, ident]);
    let Err(errors) = Lexer::new(Arc::new(vocabulary), &definition, LexerConfig::default()) else {
        panic!("lexer accepted a longer alternative outside of its mode");
    };

    assert_eq!(
        errors,
        [LexerDefinitionError::LongerAlternativeNotInMode {
            token: "IF".into(),
            alternative: "IDENT".into(),
            mode: "keywords".into(),
        }]
    );
}
