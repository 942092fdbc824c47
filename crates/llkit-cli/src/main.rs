mod grammars;
mod runner;

use std::{
    env::args,
    fmt::Debug,
    path::{Path, PathBuf},
    str::FromStr,
};

use anyhow::{anyhow, bail, Context};
use grammars::Demo;
use llkit_lexer::LexerConfig;
use llkit_parser::ParserConfig;
use runner::{ErrorReporting, PhaseRunner};
use serde::Deserialize;

fn main() {
    let level = std::env::var("RUST_LOG").unwrap_or_else(|_| "WARN".to_owned());
    let level = log::LevelFilter::from_str(&level).unwrap_or(log::LevelFilter::Warn);

    let _ = simplelog::TermLogger::init(
        level,
        simplelog::ConfigBuilder::new()
            .set_time_format_custom(&[])
            .build(),
        simplelog::TerminalMode::Stderr,
        simplelog::ColorChoice::Never,
    );

    match run() {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("{e:#}");
            std::process::exit(2);
        }
    }
}

struct StdoutSink;

impl std::fmt::Write for StdoutSink {
    fn write_str(&mut self, s: &str) -> std::fmt::Result {
        use std::io::Write as _;
        std::io::stdout()
            .write_all(s.as_bytes())
            .map_err(|_| std::fmt::Error)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct Config {
    lexer: LexerConfig,
    parser: ParserConfig,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum GrammarKind {
    Json,
    Arith,
}

struct Options {
    grammar: GrammarKind,
    config: Option<PathBuf>,
    do_tokens: bool,
    do_gast: bool,
    do_lookahead: bool,
    do_cst: bool,
    do_value: bool,
    errors: ErrorReporting,
    do_bench: bool,
    iters: u32,
    file: PathBuf,
}

impl Options {
    fn parse(args: &[String]) -> anyhow::Result<Options> {
        let mut grammar = GrammarKind::Json;
        let mut config = None;
        let mut do_tokens = false;
        let mut do_gast = false;
        let mut do_lookahead = false;
        let mut do_cst = false;
        let mut do_value = false;
        let mut errors = ErrorReporting::On;
        let mut do_bench = false;
        let mut iters = 1;

        let mut files = Vec::new();
        let mut iter = args.iter().map(String::as_str);

        while let Some(arg) = iter.next() {
            let mut value = || iter.next().with_context(|| format!("Expected argument to {arg}"));
            match arg {
                "--grammar" => {
                    grammar = match value()? {
                        "json" => GrammarKind::Json,
                        "arith" => GrammarKind::Arith,
                        other => bail!("Unknown grammar `{other}`, expected json or arith"),
                    }
                }
                "--config" => config = Some(PathBuf::from(value()?)),
                "--tokens" => do_tokens = true,
                "--gast" => do_gast = true,
                "--lookahead" => do_lookahead = true,
                "--cst" => do_cst = true,
                "--value" => do_value = true,
                "--errors" => {
                    errors = match value()? {
                        "eager" => ErrorReporting::Eager,
                        "off" => ErrorReporting::Off,
                        other => bail!("Unexpected argument to --errors `{other}`"),
                    }
                }
                "--bench" => do_bench = true,
                "--iters" => {
                    iters = value()?
                        .parse::<u32>()
                        .context("Expected a number of iterations")?;
                }
                _ => files.push(arg),
            }
        }

        let file = match files.as_slice() {
            [] => bail!("No file provided"),
            [file] => PathBuf::from(file),
            _ => bail!("Only one file may be provided"),
        };

        Ok(Options {
            grammar,
            config,
            do_tokens,
            do_gast,
            do_lookahead,
            do_cst,
            do_value,
            errors,
            do_bench,
            iters,
            file,
        })
    }
}

/// Returns whether the input was free of errors.
fn run() -> anyhow::Result<bool> {
    let args = args().skip(1).collect::<Vec<_>>();
    let options = Options::parse(&args)?;

    let config = match &options.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config `{}`", path.display()))?;
            serde_json::from_str::<Config>(&text)
                .with_context(|| format!("Invalid config `{}`", path.display()))?
        }
        None => Config::default(),
    };
    log::debug!("{config:?}");

    let src = std::fs::read_to_string(&options.file)
        .with_context(|| format!("Failed to read `{}`", options.file.display()))?;

    match options.grammar {
        GrammarKind::Json => {
            let demo = grammars::json(config.lexer)?;
            run_demo(demo, &options, &config.parser, &src)
        }
        GrammarKind::Arith => {
            let demo = grammars::arithmetic(config.lexer)?;
            run_demo(demo, &options, &config.parser, &src)
        }
    }
}

fn run_demo<R: Default + Debug + 'static>(
    demo: Demo<R>,
    options: &Options,
    config: &ParserConfig,
    src: &str,
) -> anyhow::Result<bool> {
    let Demo {
        lexer,
        definition,
        start,
    } = demo;

    let grammar = definition.compile(config).map_err(|errors| {
        let messages = errors
            .iter()
            .map(|e| format!("{:?} in rule `{}`: {}", e.kind, e.rule, e.message))
            .collect::<Vec<_>>();
        anyhow!("{errors}\n{}", messages.join("\n"))
    })?;

    if options.do_gast {
        grammar.display_rules(&mut StdoutSink)?;
        println!();
    }
    if options.do_lookahead {
        grammar.display_decisions(&mut StdoutSink)?;
        println!();
    }

    let file = display_path(&options.file);
    let runner = PhaseRunner::new(src, &file, options.errors, options.do_bench, options.iters);

    let lexed = runner.run("lex", || lexer.tokenize(src));
    runner.add(&lexed.errors);
    if options.do_tokens {
        println!("{}", serde_json::to_string_pretty(&lexed.tokens)?);
    }

    let output = runner.run("parse", || grammar.parse(start, &lexed.tokens))?;
    runner.add(&output.errors);
    runner.report_errors();

    if options.do_cst {
        if let Some(cst) = &output.cst {
            println!("{}", serde_json::to_string_pretty(cst)?);
        }
    }
    if options.do_value {
        println!("{:?}", output.value);
    }

    Ok(lexed.errors.is_empty() && output.is_ok())
}

/// The path relative to the working directory when it is below it.
fn display_path(path: &Path) -> PathBuf {
    let relative = path.canonicalize().ok().and_then(|canonic| {
        let current_dir = std::env::current_dir().ok()?;
        canonic.strip_prefix(current_dir).ok().map(Path::to_path_buf)
    });
    relative.unwrap_or_else(|| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_options() {
        let options = Options::parse(&args(&[
            "--grammar", "arith", "--cst", "--errors", "off", "--iters", "10", "input.txt",
        ]))
        .unwrap();
        assert_eq!(options.grammar, GrammarKind::Arith);
        assert!(options.do_cst && !options.do_tokens);
        assert_eq!(options.errors, ErrorReporting::Off);
        assert_eq!(options.iters, 10);
        assert_eq!(options.file, PathBuf::from("input.txt"));

        assert!(Options::parse(&args(&["--grammar", "xml", "a"])).is_err());
        assert!(Options::parse(&args(&["--iters"])).is_err());
        assert!(Options::parse(&args(&["a", "b"])).is_err());
    }

    #[test]
    fn test_config_file() {
        let config: Config = serde_json::from_str(
            r#"{ "lexer": { "recovery": false }, "parser": { "maxLookahead": 1, "recovery": true } }"#,
        )
        .unwrap();
        assert!(!config.lexer.recovery);
        assert_eq!(config.parser.max_lookahead, 1);
        assert!(config.parser.recovery);
        assert!(config.parser.strict);
    }
}
