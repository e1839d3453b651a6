use std::io::{self, BufRead, Write};

/// Yes/no decision made by the operator.
///
/// Any `FnMut(&str, bool) -> bool` is a `Confirm`, which keeps the backup
/// and prune logic free of terminal I/O.
pub trait Confirm {
    fn confirm(&mut self, message: &str, default: bool) -> bool;
}

impl<F> Confirm for F
where
    F: FnMut(&str, bool) -> bool,
{
    fn confirm(&mut self, message: &str, default: bool) -> bool {
        self(message, default)
    }
}

/// Choice hint shown after the question
pub fn choices(default: bool) -> &'static str {
    if default {
        "Y/n"
    } else {
        "y/N"
    }
}

/// Interpret an answer: empty takes the default, `y`/`yes` accept, anything else declines
pub fn parse_answer(answer: &str, default: bool) -> bool {
    match answer.trim().to_lowercase().as_str() {
        "" => default,
        "y" | "yes" => true,
        _ => false,
    }
}

/// Asks on a line-oriented input/output pair, stdin/stdout in production
pub struct TerminalPrompt<R, W> {
    input: R,
    output: W,
}

impl TerminalPrompt<io::StdinLock<'static>, io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> TerminalPrompt<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }
}

impl<R: BufRead, W: Write> Confirm for TerminalPrompt<R, W> {
    fn confirm(&mut self, message: &str, default: bool) -> bool {
        let _ = write!(self.output, "{message} ({}) ", choices(default));
        let _ = self.output.flush();

        let mut answer = String::new();
        match self.input.read_line(&mut answer) {
            // End of input is never taken as consent
            Ok(0) => {
                let _ = writeln!(self.output);
                false
            }
            Ok(_) => parse_answer(&answer, default),
            Err(e) => {
                tracing::warn!(error = %e, "could not read answer, treating as no");
                false
            }
        }
    }
}
