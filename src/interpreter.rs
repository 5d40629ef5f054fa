use crate::command::{Registry, Streams};
use crate::config::Config;
use crate::env::Environment;
use crate::executor::{ExecError, Executor};
use crate::expander::{ExpandError, Expander};
use crate::lexer::{self, LexError};
use crate::parser::{self, ParseError};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use thiserror::Error;

/// Why a line failed, tagged with the stage that rejected it.
#[derive(Debug, Error)]
pub enum ShellError {
    #[error("lexical analysis failed: {0}")]
    Lex(#[from] LexError),
    #[error("parsing failed: {0}")]
    Parse(#[from] ParseError),
    #[error("expansion failed: {0}")]
    Expand(#[from] ExpandError),
    #[error(transparent)]
    Exec(#[from] ExecError),
}

/// A shell session: the environment, the builtins, and the line pipeline
/// tokenize → parse → expand → execute.
///
/// Example
/// ```
/// use shell_interpreter::{Interpreter, MemReader, MemWriter, Streams};
/// let mut sh = Interpreter::default();
/// sh.eval_with("GREETING=hello", Streams::new(MemReader::new(""), MemWriter::new())).unwrap();
///
/// let (out, handle) = MemWriter::with_handle();
/// sh.eval_with("echo $GREETING world | wc", Streams::new(MemReader::new(""), out)).unwrap();
/// assert_eq!(MemWriter::contents(&handle), "1 2 12\n");
/// ```
pub struct Interpreter {
    config: Config,
    env: Environment,
    registry: Registry,
    expander: Expander,
}

impl Interpreter {
    /// Start a session over a snapshot of the process environment.
    pub fn new(config: Config, registry: Registry) -> Self {
        Self {
            expander: Expander::new(config.prefix_fallback),
            env: Environment::new(),
            config,
            registry,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    pub fn env_mut(&mut self) -> &mut Environment {
        &mut self.env
    }

    /// Evaluate one line against the process's real standard streams.
    pub fn eval(&mut self, line: &str) -> Result<(), ShellError> {
        self.eval_with(line, Streams::inherited())
    }

    /// Evaluate one line with the given input and output.
    ///
    /// Blank lines succeed without doing anything. Lexing, parsing and expansion all
    /// finish before anything runs, so a line rejected by one of them has no effect.
    pub fn eval_with(&mut self, line: &str, streams: Streams) -> Result<(), ShellError> {
        if line.trim().is_empty() {
            return Ok(());
        }

        let tokens = lexer::tokenize(line)?;
        tracing::debug!(?tokens, "tokenized");
        let ast = parser::parse(tokens)?;
        tracing::debug!(%ast, "parsed");
        let expanded = self.expander.expand(&ast, &mut self.env)?;

        Executor::new(&self.registry).execute_with(&expanded, &mut self.env, streams)?;
        Ok(())
    }

    /// Read-Eval-Print Loop over the terminal.
    ///
    /// Errors of a line are printed and the loop goes on. Ctrl-C abandons the current
    /// line, Ctrl-D ends the session.
    pub fn repl(&mut self) -> anyhow::Result<()> {
        let mut rl = DefaultEditor::new()?;
        if let Some(path) = &self.config.history {
            if let Err(e) = rl.load_history(path) {
                tracing::debug!(path = %path.display(), error = %e, "no history loaded");
            }
        }

        loop {
            let prompt = self.config.prompt.clone();
            match rl.readline(&prompt) {
                Ok(line) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    self.remember(&mut rl, &line);
                    if let Err(err) = self.eval(&line) {
                        eprintln!("Error: {err}");
                    }
                }
                Err(ReadlineError::Interrupted) => continue,
                Err(ReadlineError::Eof) => break,
                Err(err) => return Err(err.into()),
            }
        }

        Ok(())
    }

    /// Record `line` in the editor's history and on disk right away, so a line that
    /// ends the process (`exit`) is not lost.
    fn remember(&self, rl: &mut DefaultEditor, line: &str) {
        if let Err(e) = rl.add_history_entry(line) {
            tracing::warn!(error = %e, "failed to add history entry");
        }
        if let Some(path) = &self.config.history {
            if let Err(e) = rl.append_history(path) {
                tracing::warn!(path = %path.display(), error = %e, "failed to save history");
            }
        }
    }
}

impl Default for Interpreter {
    /// Default configuration with the standard builtins.
    fn default() -> Self {
        Self::new(Config::default(), Registry::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io_adapters::{MemReader, MemWriter};

    fn eval(sh: &mut Interpreter, line: &str) -> (Result<(), ShellError>, String) {
        let (out, handle) = MemWriter::with_handle();
        let result = sh.eval_with(line, Streams::new(MemReader::new(""), out));
        (result, MemWriter::contents(&handle))
    }

    fn interpreter() -> Interpreter {
        let mut sh = Interpreter::default();
        sh.env_mut().clear_local();
        sh
    }

    #[test]
    fn test_blank_lines_are_ignored() {
        let mut sh = interpreter();
        for line in ["", "   ", "\t"] {
            let (result, out) = eval(&mut sh, line);
            assert!(result.is_ok());
            assert!(out.is_empty());
        }
    }

    #[test]
    fn test_errors_name_their_stage() {
        let mut sh = interpreter();
        let message = |sh: &mut Interpreter, line| eval(sh, line).0.unwrap_err().to_string();

        assert_eq!(
            message(&mut sh, "echo 'abc"),
            "lexical analysis failed: unclosed single quote"
        );
        assert_eq!(
            message(&mut sh, "echo |"),
            "parsing failed: empty command after pipe"
        );
        assert_eq!(
            message(&mut sh, "echo ${X"),
            "expansion failed: unterminated ${ variable"
        );
        assert_eq!(
            message(&mut sh, "grep x"),
            "command grep exited with code 1"
        );
    }

    #[test]
    fn test_assignments_across_lines() {
        let mut sh = interpreter();
        assert!(eval(&mut sh, "X=5").0.is_ok());
        assert_eq!(eval(&mut sh, "echo $X").1, "5\n");

        assert_eq!(eval(&mut sh, "TEMP=t echo $TEMP").1, "t\n");
        assert_eq!(eval(&mut sh, "echo '$HOME'").1, "$HOME\n");
        assert_eq!(sh.env().get("TEMP"), None);

        assert!(eval(&mut sh, "X=foo Y=$X").0.is_ok());
        assert_eq!(sh.env().get("Y"), Some("foo"));
    }

    #[test]
    fn test_failed_line_leaves_environment_untouched() {
        let mut sh = interpreter();
        assert!(matches!(
            eval(&mut sh, "A=1 B=${oops echo").0,
            Err(ShellError::Expand(ExpandError::UnterminatedBrace))
        ));
        assert_eq!(sh.env().get("A"), None);
    }

    #[test]
    fn test_prefix_fallback_follows_config() {
        let mut sh = interpreter();
        eval(&mut sh, "VAR=value").0.unwrap();
        assert_eq!(eval(&mut sh, "echo $VAR_suffix").1, "value_suffix\n");

        let config = Config {
            prefix_fallback: false,
            ..Config::default()
        };
        let mut posix = Interpreter::new(config, Registry::default());
        eval(&mut posix, "VAR=value").0.unwrap();
        assert_eq!(eval(&mut posix, "echo $VAR_suffix").1, "\n");
    }

    #[test]
    fn test_command_name_from_variables() {
        let mut sh = interpreter();
        eval(&mut sh, "X=ec").0.unwrap();
        eval(&mut sh, "Y=ho").0.unwrap();
        assert_eq!(eval(&mut sh, "$X$Y hi").1, "hi\n");
    }
}
