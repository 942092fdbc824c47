use std::{cell::RefCell, fmt::Display, path::Path};

use llkit_lexer::{LexicalError, LineCol};
use llkit_parser::RecognitionError;

pub struct UnitPrinter {
    value: f64,
    suffixes: &'static [(&'static str, f64)],
}

#[allow(non_upper_case_globals)]
impl UnitPrinter {
    pub fn bytes(value: f64) -> Self {
        const KiB: f64 = 1.0 / 1024.0;

        Self {
            value,
            suffixes: &[("MiB", KiB * KiB), ("KiB", KiB), ("B", 1.0)],
        }
    }
    pub fn seconds(value: f64) -> Self {
        const ms: f64 = 1000.0;
        Self {
            value,
            suffixes: &[
                ("s", 1.0),
                ("ms", ms),
                ("µs", ms * ms),
                ("ns", ms * ms * ms),
            ],
        }
    }
}

impl Display for UnitPrinter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // smallest scaled value which is still at least one
        let mut best: Option<(f64, &'static str)> = None;
        for &(name, factor) in self.suffixes {
            let value = self.value * factor;
            let better = match best {
                None => true,
                Some((best, _)) if best >= 1.0 => value < best && value >= 1.0,
                Some((best, _)) => value > best,
            };
            if better {
                best = Some((value, name));
            }
        }

        match best {
            Some((value, suffix)) => write!(f, "{value:.2} {suffix}"),
            None => write!(f, "{:.2}", self.value),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ErrorReporting {
    On,
    Eager,
    Off,
}

/// A problem found in the input file.
pub struct Diagnostic {
    pub offset: u32,
    pub position: Option<LineCol>,
    pub message: String,
}

impl From<&LexicalError> for Diagnostic {
    fn from(error: &LexicalError) -> Self {
        Diagnostic {
            offset: error.span.start(),
            position: error.start,
            message: error.message.clone(),
        }
    }
}

impl From<&RecognitionError> for Diagnostic {
    fn from(error: &RecognitionError) -> Self {
        Diagnostic {
            offset: error.token.span.start(),
            position: error.token.start,
            message: error.message.clone(),
        }
    }
}

/// Runs phases over a single input file, timing them and reporting their diagnostics.
pub struct PhaseRunner<'a, 'b> {
    src: &'a str,
    file: &'b Path,
    diagnostics: RefCell<Vec<Diagnostic>>,
    errors: ErrorReporting,
    do_bench: bool,
    iters: u32,
}

impl<'a, 'b> PhaseRunner<'a, 'b> {
    pub fn new(
        src: &'a str,
        file: &'b Path,
        errors: ErrorReporting,
        do_bench: bool,
        iters: u32,
    ) -> PhaseRunner<'a, 'b> {
        PhaseRunner {
            src,
            file,
            diagnostics: RefCell::new(Vec::new()),
            errors,
            do_bench,
            iters: iters.max(1),
        }
    }

    pub fn run<F: FnMut() -> T, T>(&self, name: &str, mut fun: F) -> T {
        let start = std::time::Instant::now();
        let mut output = fun();
        for _ in 1..self.iters {
            output = fun();
        }
        let elapsed = (start.elapsed() / self.iters).as_secs_f64();

        if self.do_bench {
            let time = UnitPrinter::seconds(elapsed);
            let throughput = UnitPrinter::bytes(self.src.len() as f64 / elapsed);
            eprintln!("{name}\t {time}\t {throughput}/s");
        }
        log::debug!("Phase {name} finished");

        output
    }

    pub fn add<'e, D>(&self, diagnostics: impl IntoIterator<Item = &'e D>)
    where
        D: 'e,
        &'e D: Into<Diagnostic>,
    {
        self.diagnostics
            .borrow_mut()
            .extend(diagnostics.into_iter().map(Into::into));
        if self.errors == ErrorReporting::Eager {
            self.report_errors();
        }
    }

    pub fn report_errors(&self) {
        let diagnostics = std::mem::take(&mut *self.diagnostics.borrow_mut());
        if self.errors == ErrorReporting::Off {
            return;
        }

        let file = self.file.display();
        for d in diagnostics {
            let LineCol { line, column } = d
                .position
                .unwrap_or_else(|| line_col(self.src, d.offset as usize));
            eprintln!("{file}:{line}:{column} {}", d.message);
        }
    }
}

/// 1-based position of a byte offset.
pub fn line_col(src: &str, offset: usize) -> LineCol {
    let before = &src[..offset.min(src.len())];
    let line = before.matches('\n').count() as u32 + 1;
    let line_start = before.rfind('\n').map_or(0, |i| i + 1);
    LineCol {
        line,
        column: before[line_start..].chars().count() as u32 + 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_col() {
        let src = "ab\ncd\n";
        assert_eq!(line_col(src, 0), LineCol { line: 1, column: 1 });
        assert_eq!(line_col(src, 4), LineCol { line: 2, column: 2 });
        assert_eq!(line_col(src, 100), LineCol { line: 3, column: 1 });
    }

    #[test]
    fn test_unit_printer() {
        assert_eq!(UnitPrinter::seconds(0.0025).to_string(), "2.50 ms");
        assert_eq!(UnitPrinter::bytes(3.0 * 1024.0 * 1024.0).to_string(), "3.00 MiB");
        assert_eq!(UnitPrinter::bytes(12.0).to_string(), "12.00 B");
    }
}
