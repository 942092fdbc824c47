//! Grammars built into the command line tool.

use std::sync::Arc;

use anyhow::anyhow;
use llkit_lexer::{Lexer, LexerConfig, LexerDefinition, TokenType, Vocabulary};
use llkit_parser::{Alt, GrammarDefinition};

pub struct Demo<R> {
    pub lexer: Lexer,
    pub definition: GrammarDefinition<R>,
    pub start: &'static str,
}

fn build_lexer(
    vocabulary: Vocabulary,
    definition: &LexerDefinition,
    config: LexerConfig,
) -> anyhow::Result<(Arc<Vocabulary>, Lexer)> {
    let vocabulary = Arc::new(vocabulary);
    let lexer = Lexer::new(vocabulary.clone(), definition, config).map_err(|errors| {
        let messages = errors.iter().map(|e| e.to_string()).collect::<Vec<_>>();
        anyhow!("Invalid lexer definition:\n  {}", messages.join("\n  "))
    })?;
    Ok((vocabulary, lexer))
}

pub fn json(config: LexerConfig) -> anyhow::Result<Demo<()>> {
    let mut v = Vocabulary::new();
    let whitespace = v.define(TokenType::regex("WhiteSpace", r"[ \t\n\r]+").skip());
    let string = v.define(TokenType::regex(
        "StringLiteral",
        r#""(?:[^\\"]|\\(?:[bfnrtv"\\/]|u[0-9a-fA-F]{4}))*""#,
    ));
    let number = v.define(TokenType::regex(
        "NumberLiteral",
        r"-?(?:0|[1-9]\d*)(?:\.\d+)?(?:[eE][+-]?\d+)?",
    ));
    let lcurly = v.define(TokenType::literal("LCurly", "{"));
    let rcurly = v.define(TokenType::literal("RCurly", "}"));
    let lsquare = v.define(TokenType::literal("LSquare", "["));
    let rsquare = v.define(TokenType::literal("RSquare", "]"));
    let comma = v.define(TokenType::literal("Comma", ","));
    let colon = v.define(TokenType::literal("Colon", ":"));
    let true_ = v.define(TokenType::literal("True", "true"));
    let false_ = v.define(TokenType::literal("False", "false"));
    let null = v.define(TokenType::literal("Null", "null"));

    let lexer_definition = LexerDefinition::single([
        whitespace, string, number, lcurly, rcurly, lsquare, rsquare, comma, colon, true_,
        false_, null,
    ]);
    let (vocabulary, lexer) = build_lexer(v, &lexer_definition, config)?;

    let definition = GrammarDefinition::<()>::new(vocabulary)
        .rule("json", |d| {
            d.or(
                0,
                &mut [
                    Alt::new(&mut |d| d.subrule(0, "object")),
                    Alt::new(&mut |d| d.subrule(0, "array")),
                ],
            )
        })
        .rule("object", move |d| {
            d.consume(0, lcurly)?;
            d.many_sep(0, comma, &mut |d| d.subrule(0, "objectItem"))?;
            d.consume(0, rcurly)?;
            Ok(())
        })
        .rule("objectItem", move |d| {
            d.consume(0, string)?;
            d.consume(0, colon)?;
            d.subrule(0, "value")
        })
        .rule("array", move |d| {
            d.consume(0, lsquare)?;
            d.many_sep(0, comma, &mut |d| d.subrule(0, "value"))?;
            d.consume(0, rsquare)?;
            Ok(())
        })
        .rule("value", move |d| {
            d.or(
                0,
                &mut [
                    Alt::new(&mut |d| d.consume(0, string).map(drop)),
                    Alt::new(&mut |d| d.consume(0, number).map(drop)),
                    Alt::new(&mut |d| d.subrule(0, "object")),
                    Alt::new(&mut |d| d.subrule(0, "array")),
                    Alt::new(&mut |d| d.consume(0, true_).map(drop)),
                    Alt::new(&mut |d| d.consume(0, false_).map(drop)),
                    Alt::new(&mut |d| d.consume(0, null).map(drop)),
                ],
            )
        });

    Ok(Demo {
        lexer,
        definition,
        start: "json",
    })
}

/// Calculator over floats, rule bodies compute the value while parsing.
pub fn arithmetic(config: LexerConfig) -> anyhow::Result<Demo<f64>> {
    let mut v = Vocabulary::new();
    let whitespace = v.define(TokenType::regex("WhiteSpace", r"\s+").skip());
    let additive = v.define(TokenType::category("AdditionOperator"));
    let multiplicative = v.define(TokenType::category("MultiplicationOperator"));
    let plus = v.define(TokenType::literal("Plus", "+").in_category(additive));
    let minus = v.define(TokenType::literal("Minus", "-").in_category(additive));
    let multi = v.define(TokenType::literal("Multi", "*").in_category(multiplicative));
    let div = v.define(TokenType::literal("Div", "/").in_category(multiplicative));
    let lparen = v.define(TokenType::literal("LParen", "("));
    let rparen = v.define(TokenType::literal("RParen", ")"));
    let number = v.define(TokenType::regex("NumberLiteral", r"\d+(?:\.\d+)?"));
    let power = v.define(TokenType::literal("PowerFunc", "power"));
    let comma = v.define(TokenType::literal("Comma", ","));

    let lexer_definition = LexerDefinition::single([
        whitespace, plus, minus, multi, div, lparen, rparen, number, power, comma,
    ]);
    let (vocabulary, lexer) = build_lexer(v, &lexer_definition, config)?;

    let definition = GrammarDefinition::<f64>::new(vocabulary)
        .rule("expression", |d| d.subrule(0, "additionExpression"))
        .rule("additionExpression", move |d| {
            let mut value = d.subrule(0, "multiplicationExpression")?;
            d.many(0, &mut |d| {
                let operator = d.consume(0, additive)?;
                let rhs = d.subrule(1, "multiplicationExpression")?;
                if operator.kind == plus {
                    value += rhs;
                } else {
                    value -= rhs;
                }
                Ok(())
            })?;
            Ok(value)
        })
        .rule("multiplicationExpression", move |d| {
            let mut value = d.subrule(0, "atomicExpression")?;
            d.many(0, &mut |d| {
                let operator = d.consume(0, multiplicative)?;
                let rhs = d.subrule(1, "atomicExpression")?;
                if operator.kind == multi {
                    value *= rhs;
                } else {
                    value /= rhs;
                }
                Ok(())
            })?;
            Ok(value)
        })
        .rule("atomicExpression", move |d| {
            d.or(
                0,
                &mut [
                    Alt::new(&mut |d| d.subrule(0, "parenthesisExpression")),
                    Alt::new(&mut |d| {
                        let token = d.consume(0, number)?;
                        // recorded and inserted tokens have no image
                        Ok(token.image.parse().unwrap_or_default())
                    }),
                    Alt::new(&mut |d| d.subrule(0, "powerFunction")),
                ],
            )
        })
        .rule("parenthesisExpression", move |d| {
            d.consume(0, lparen)?;
            let value = d.subrule(0, "expression")?;
            d.consume(0, rparen)?;
            Ok(value)
        })
        .rule("powerFunction", move |d| {
            d.consume(0, power)?;
            d.consume(0, lparen)?;
            let base = d.subrule(0, "expression")?;
            d.consume(0, comma)?;
            let exponent = d.subrule(1, "expression")?;
            d.consume(0, rparen)?;
            Ok(base.powf(exponent))
        });

    Ok(Demo {
        lexer,
        definition,
        start: "expression",
    })
}

#[cfg(test)]
mod tests {
    use llkit_parser::ParserConfig;

    use super::*;

    #[test]
    fn test_arithmetic_value() {
        let demo = arithmetic(LexerConfig::default()).unwrap();
        let grammar = demo.definition.compile(&ParserConfig::default()).unwrap();
        let tokens = demo.lexer.tokenize("2 * (3 + power(2, 3)) - 1 / 4").tokens;

        let output = grammar.parse(demo.start, &tokens).unwrap();
        assert!(output.is_ok(), "{:?}", output.errors);
        assert_eq!(output.value, 21.75);
    }

    #[test]
    fn test_json() {
        let demo = json(LexerConfig::default()).unwrap();
        let grammar = demo.definition.compile(&ParserConfig::default()).unwrap();
        let text = r#"{ "a": [1, -2.5e3, true, null], "b": { "c": "d\"" } }"#;
        let lexed = demo.lexer.tokenize(text);
        assert!(lexed.errors.is_empty(), "{:?}", lexed.errors);

        let output = grammar.parse(demo.start, &lexed.tokens).unwrap();
        assert!(output.is_ok(), "{:?}", output.errors);

        let cst = output.cst.unwrap();
        let object = cst.nodes("object").next().unwrap();
        assert_eq!(object.nodes("objectItem").count(), 2);
        assert_eq!(cst.source_tokens().len(), lexed.tokens.len());
    }
}
