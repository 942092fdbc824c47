#![allow(dead_code)]

use std::sync::Arc;

use llkit_lexer::{
    Group, Lexer, LexerConfig, LexerDefinition, Token, TokenType, TokenTypeId, Vocabulary,
};
use llkit_parser::{Alt, Grammar, GrammarDefinition, ParserConfig};

pub struct Tokens {
    pub number: TokenTypeId,
    pub ident: TokenTypeId,
    pub operator: TokenTypeId,
    pub plus: TokenTypeId,
    pub minus: TokenTypeId,
    pub eq: TokenTypeId,
    pub semi: TokenTypeId,
    pub lparen: TokenTypeId,
    pub rparen: TokenTypeId,
}

pub struct Fixture {
    pub vocabulary: Arc<Vocabulary>,
    pub lexer: Lexer,
    pub t: Tokens,
}

impl Fixture {
    pub fn new() -> Fixture {
        Self::with_whitespace(Group::Skip)
    }

    pub fn with_whitespace(group: Group) -> Fixture {
        let mut vocabulary = Vocabulary::new();
        let whitespace = vocabulary.define(TokenType::regex("Whitespace", r"\s+").group(group));
        let operator = vocabulary.define(TokenType::category("Operator"));
        let t = Tokens {
            number: vocabulary.define(TokenType::regex("Number", "[0-9]+")),
            ident: vocabulary.define(TokenType::regex("Ident", "[a-z]+")),
            operator,
            plus: vocabulary.define(TokenType::literal("Plus", "+").in_category(operator)),
            minus: vocabulary.define(TokenType::literal("Minus", "-").in_category(operator)),
            eq: vocabulary.define(TokenType::literal("Eq", "=")),
            semi: vocabulary.define(TokenType::literal("Semi", ";")),
            lparen: vocabulary.define(TokenType::literal("LParen", "(")),
            rparen: vocabulary.define(TokenType::literal("RParen", ")")),
        };

        let definition = LexerDefinition::single([
            whitespace, t.number, t.ident, t.plus, t.minus, t.eq, t.semi, t.lparen, t.rparen,
        ]);
        let vocabulary = Arc::new(vocabulary);
        let lexer = Lexer::new(vocabulary.clone(), &definition, LexerConfig::default()).unwrap();

        Fixture {
            vocabulary,
            lexer,
            t,
        }
    }

    pub fn tokens(&self, text: &str) -> Vec<Token> {
        let result = self.lexer.tokenize(text);
        assert!(result.errors.is_empty(), "{:?}", result.errors);
        result.tokens
    }

    /// `expr: Number ((Plus | Minus) Number)*`
    pub fn arithmetic(&self) -> GrammarDefinition<()> {
        let Tokens {
            number, plus, minus, ..
        } = self.t;
        GrammarDefinition::new(self.vocabulary.clone()).rule("expr", move |d| {
            d.consume(0, number)?;
            d.many(0, &mut |d| {
                d.or(
                    0,
                    &mut [
                        Alt::new(&mut |d| {
                            d.consume_as(0, plus, "operator")?;
                            Ok(())
                        }),
                        Alt::new(&mut |d| {
                            d.consume_as(0, minus, "operator")?;
                            Ok(())
                        }),
                    ],
                )?;
                d.consume(1, number)?;
                Ok(())
            })
        })
    }

    /// `program: statement* EOF`, `statement: Ident Eq expr Semi` and
    /// `expr: Number (Operator Number)*`
    pub fn statements(&self) -> GrammarDefinition<()> {
        let Tokens {
            number,
            ident,
            operator,
            eq,
            semi,
            ..
        } = self.t;
        GrammarDefinition::new(self.vocabulary.clone())
            .rule("program", move |d| {
                d.many(0, &mut |d| d.subrule(0, "statement"))?;
                d.consume(0, TokenTypeId::EOF)?;
                Ok(())
            })
            .rule("statement", move |d| {
                d.consume(0, ident)?;
                d.consume(0, eq)?;
                d.subrule(0, "expr")?;
                d.consume(0, semi)?;
                Ok(())
            })
            .rule("expr", move |d| {
                d.consume(0, number)?;
                d.many(0, &mut |d| {
                    d.consume(0, operator)?;
                    d.consume(1, number)?;
                    Ok(())
                })
            })
    }

    pub fn compile(&self, definition: GrammarDefinition<()>, config: ParserConfig) -> Grammar<()> {
        match definition.compile(&config) {
            Ok(grammar) => grammar,
            Err(errors) => panic!("{errors}: {:#?}", errors.0),
        }
    }
}

pub fn recovering() -> ParserConfig {
    ParserConfig {
        recovery: true,
        ..ParserConfig::default()
    }
}
