mod common;

use common::{recovering, Fixture};
use llkit_lexer::Group;
use llkit_parser::ParserConfig;
use proptest::prelude::*;

fn expression() -> impl Strategy<Value = String> {
    let number = "[0-9]{1,4}";
    let operator = prop_oneof!["[+]", "-"];
    let space = "[ \n]{0,2}";
    (
        number,
        proptest::collection::vec((space, operator, space, number), 0..16),
    )
        .prop_map(|(first, rest)| {
            let mut text = first;
            for (before, operator, after, number) in rest {
                text.push_str(&before);
                text.push_str(&operator);
                text.push_str(&after);
                text.push_str(&number);
            }
            text
        })
}

proptest! {
    #[test]
    fn test_cst_holds_every_token(text in expression()) {
        let f = Fixture::new();
        let grammar = f.compile(f.arithmetic(), ParserConfig::default());
        let tokens = f.tokens(&text);

        let output = grammar.parse("expr", &tokens).unwrap();
        prop_assert!(output.is_ok(), "{:?}", output.errors);

        let cst = output.cst.unwrap();
        let parsed = cst.source_tokens().into_iter().cloned().collect::<Vec<_>>();
        prop_assert_eq!(parsed, tokens);
    }

    #[test]
    fn test_cst_and_groups_rebuild_text(
        (before, text, after) in ("[ \n]{0,2}", expression(), "[ \n]{0,2}")
    ) {
        let f = Fixture::with_whitespace(Group::Named("whitespace".into()));
        let grammar = f.compile(f.arithmetic(), ParserConfig::default());
        let input = format!("{before}{text}{after}");
        let lexed = f.lexer.tokenize(&input);
        prop_assert!(lexed.errors.is_empty(), "{:?}", lexed.errors);

        let output = grammar.parse("expr", &lexed.tokens).unwrap();
        prop_assert!(output.is_ok(), "{:?}", output.errors);

        let cst = output.cst.unwrap();
        let mut all = cst.source_tokens();
        all.extend(lexed.groups.get("whitespace").into_iter().flatten());
        all.sort_by_key(|t| t.span.start());

        let rebuilt = all.iter().map(|t| t.image.as_str()).collect::<String>();
        prop_assert_eq!(rebuilt, input);
    }

    #[test]
    fn test_recovery_terminates(text in "[0-9+ ;=a-z()-]{0,40}") {
        let f = Fixture::new();
        let grammar = f.compile(f.statements(), recovering());
        let tokens = f.tokens(&text);

        let output = grammar.parse("program", &tokens).unwrap();
        let cst = output.cst.unwrap();
        for token in cst.source_tokens() {
            prop_assert!(tokens.contains(token) || token.is_eof());
        }
    }
}
