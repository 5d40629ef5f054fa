//! Lexical analysis (tokenization) of a single command line.
//!
//! The lexer only knows about quotes, pipes, whitespace and the `NAME=` assignment
//! prefix. Backslashes and `$` are passed through untouched; they only mean something
//! to the expander.

use std::fmt;
use thiserror::Error;

/// Classification of a [`Token`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// An unquoted run of ordinary characters.
    Word,
    /// The pipe operator, `|`.
    Pipe,
    /// Content of a `'...'` section, quotes stripped.
    SingleQuoted,
    /// Content of a `"..."` section, quotes stripped.
    DoubleQuoted,
    /// A variable name that was directly followed by `=`. The `=` is consumed.
    Assign,
}

/// A token resulting from lexical analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TokenKind::Word => write!(f, "WORD({})", self.text),
            TokenKind::Pipe => write!(f, "PIPE"),
            TokenKind::SingleQuoted => write!(f, "SINGLE_QUOTED({})", self.text),
            TokenKind::DoubleQuoted => write!(f, "DOUBLE_QUOTED({})", self.text),
            TokenKind::Assign => write!(f, "ASSIGN({})", self.text),
        }
    }
}

/// Errors that can occur during lexical analysis.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LexError {
    #[error("unclosed single quote")]
    UnclosedSingleQuote,
    #[error("unclosed double quote")]
    UnclosedDoubleQuote,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LexingState {
    Unquoted,
    SingleQuote,
    DoubleQuote,
}

struct LexingFSM {
    state: LexingState,
    buffer: String,
    tokens: Vec<Token>,
}

impl LexingFSM {
    fn new() -> Self {
        LexingFSM {
            state: LexingState::Unquoted,
            buffer: String::new(),
            tokens: Vec::new(),
        }
    }

    fn make_tokens(mut self, line: &str) -> Result<Vec<Token>, LexError> {
        for ch in line.chars() {
            match self.state {
                LexingState::Unquoted => self.handle_unquoted(ch),
                LexingState::SingleQuote => self.handle_single_quote(ch),
                LexingState::DoubleQuote => self.handle_double_quote(ch),
            }
        }

        // A dangling quote is reported before anything gets flushed.
        match self.state {
            LexingState::SingleQuote => return Err(LexError::UnclosedSingleQuote),
            LexingState::DoubleQuote => return Err(LexError::UnclosedDoubleQuote),
            LexingState::Unquoted => {}
        }

        self.flush_word();
        Ok(self.tokens)
    }

    fn handle_unquoted(&mut self, ch: char) {
        match ch {
            '\'' => {
                self.flush_word();
                self.state = LexingState::SingleQuote;
            }
            '"' => {
                self.flush_word();
                self.state = LexingState::DoubleQuote;
            }
            '|' => {
                self.flush_word();
                self.tokens.push(Token::new(TokenKind::Pipe, "|"));
            }
            '=' if is_identifier(&self.buffer) => {
                let name = std::mem::take(&mut self.buffer);
                self.tokens.push(Token::new(TokenKind::Assign, name));
            }
            c if c.is_whitespace() => self.flush_word(),
            c => self.buffer.push(c),
        }
    }

    fn handle_single_quote(&mut self, ch: char) {
        match ch {
            '\'' => self.close_quote(TokenKind::SingleQuoted),
            c => self.buffer.push(c),
        }
    }

    fn handle_double_quote(&mut self, ch: char) {
        match ch {
            '"' => self.close_quote(TokenKind::DoubleQuoted),
            c => self.buffer.push(c),
        }
    }

    /// Quoted sections always produce a token, even when empty.
    fn close_quote(&mut self, kind: TokenKind) {
        let text = std::mem::take(&mut self.buffer);
        self.tokens.push(Token::new(kind, text));
        self.state = LexingState::Unquoted;
    }

    fn flush_word(&mut self) {
        if !self.buffer.is_empty() {
            let text = std::mem::take(&mut self.buffer);
            self.tokens.push(Token::new(TokenKind::Word, text));
        }
    }
}

/// Whether `name` matches `[A-Za-z_][A-Za-z0-9_]*`.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Split `line` into tokens.
///
/// # Errors
/// Returns a [`LexError`] when a single or double quote is left open.
pub fn tokenize(line: &str) -> Result<Vec<Token>, LexError> {
    LexingFSM::new().make_tokens(line)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(s: &str) -> Token {
        Token::new(TokenKind::Word, s)
    }

    #[test]
    fn test_assignment_command_and_quotes() {
        let tokens = tokenize("VAR=value cmd a 'b c' \"d e\"").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::new(TokenKind::Assign, "VAR"),
                word("value"),
                word("cmd"),
                word("a"),
                Token::new(TokenKind::SingleQuoted, "b c"),
                Token::new(TokenKind::DoubleQuoted, "d e"),
            ]
        );
    }

    #[test]
    fn test_pipe_splits_words_without_spaces() {
        let tokens = tokenize("echo hi|wc").unwrap();
        assert_eq!(
            tokens,
            vec![
                word("echo"),
                word("hi"),
                Token::new(TokenKind::Pipe, "|"),
                word("wc"),
            ]
        );
    }

    #[test]
    fn test_pipe_inside_quotes_is_literal() {
        let tokens = tokenize("echo 'a|b' \"c|d\"").unwrap();
        assert_eq!(tokens[1], Token::new(TokenKind::SingleQuoted, "a|b"));
        assert_eq!(tokens[2], Token::new(TokenKind::DoubleQuoted, "c|d"));
    }

    #[test]
    fn test_equals_that_is_not_an_assignment() {
        assert_eq!(tokenize("=foo").unwrap(), vec![word("=foo")]);
        assert_eq!(tokenize("1x=2").unwrap(), vec![word("1x=2")]);
        assert_eq!(tokenize("--opt=1").unwrap(), vec![word("--opt=1")]);
        assert_eq!(tokenize("dir/a=b").unwrap(), vec![word("dir/a=b")]);
        assert_eq!(
            tokenize("a=x-y=z").unwrap(),
            vec![Token::new(TokenKind::Assign, "a"), word("x-y=z")]
        );
    }

    #[test]
    fn test_empty_quotes_still_emit_tokens() {
        let tokens = tokenize("echo '' \"\"").unwrap();
        assert_eq!(
            tokens,
            vec![
                word("echo"),
                Token::new(TokenKind::SingleQuoted, ""),
                Token::new(TokenKind::DoubleQuoted, ""),
            ]
        );
    }

    #[test]
    fn test_quote_flushes_pending_word() {
        let tokens = tokenize("ab'cd'ef").unwrap();
        assert_eq!(
            tokens,
            vec![
                word("ab"),
                Token::new(TokenKind::SingleQuoted, "cd"),
                word("ef"),
            ]
        );
    }

    #[test]
    fn test_other_quote_kind_is_literal_inside_quotes() {
        let tokens = tokenize("\"it's\" 'say \"hi\"'").unwrap();
        assert_eq!(tokens[0], Token::new(TokenKind::DoubleQuoted, "it's"));
        assert_eq!(tokens[1], Token::new(TokenKind::SingleQuoted, "say \"hi\""));
    }

    #[test]
    fn test_backslash_and_dollar_pass_through() {
        let tokens = tokenize(r"echo \$HOME ${X}").unwrap();
        assert_eq!(tokens, vec![word("echo"), word(r"\$HOME"), word("${X}")]);
    }

    #[test]
    fn test_unclosed_quotes() {
        assert_eq!(tokenize("echo 'abc"), Err(LexError::UnclosedSingleQuote));
        assert_eq!(tokenize("echo \"abc"), Err(LexError::UnclosedDoubleQuote));
        assert_eq!(tokenize("'"), Err(LexError::UnclosedSingleQuote));
    }

    #[test]
    fn test_whitespace_only_line() {
        assert!(tokenize("  \t ").unwrap().is_empty());
    }

    #[test]
    fn test_identifier_grammar() {
        assert!(is_identifier("_a1"));
        assert!(is_identifier("PATH"));
        assert!(!is_identifier(""));
        assert!(!is_identifier("1a"));
        assert!(!is_identifier("a-b"));
    }

    #[test]
    fn test_token_display() {
        assert_eq!(Token::new(TokenKind::Assign, "X").to_string(), "ASSIGN(X)");
        assert_eq!(Token::new(TokenKind::Pipe, "|").to_string(), "PIPE");
    }
}
