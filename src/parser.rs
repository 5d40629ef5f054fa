use crate::ast::{Argument, Assignment, Command, Node, Pipeline, Quoting};
use crate::lexer::{Token, TokenKind};
use thiserror::Error;

/// Errors that can occur while building the syntax tree.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The line contained no tokens at all.
    #[error("empty command")]
    Empty,
    /// A `|` with nothing in front of it (e.g. `| cmd` or `a | | b`).
    #[error("empty command before pipe")]
    EmptyBeforePipe,
    /// A trailing `|` with nothing after it.
    #[error("empty command after pipe")]
    EmptyAfterPipe,
    /// `NAME=` was the last token of its command.
    #[error("assignment without value")]
    AssignmentWithoutValue,
    /// `NAME=` was followed by something that cannot be a value.
    #[error("invalid assignment value")]
    InvalidAssignmentValue,
    /// A segment produced neither a name nor an assignment.
    #[error("command name or assignment is required")]
    MissingCommand,
}

struct AstBuilder {
    tokens: Vec<Token>,
    pos: usize,
}

impl AstBuilder {
    fn from(tokens: Vec<Token>) -> Self {
        AstBuilder { tokens, pos: 0 }
    }

    fn build_ast(mut self) -> Result<Node, ParseError> {
        if self.tokens.is_empty() {
            return Err(ParseError::Empty);
        }

        let mut stages = self.parse_pipeline()?;
        if stages.len() == 1 {
            Ok(Node::Command(stages.remove(0)))
        } else {
            Ok(Node::Pipeline(Pipeline { stages }))
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn consume(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn at_pipe(&self) -> bool {
        matches!(self.peek(), Some(t) if t.kind == TokenKind::Pipe)
    }

    /// Parse a pipeline: command ('|' command)*
    fn parse_pipeline(&mut self) -> Result<Vec<Command>, ParseError> {
        let mut stages = Vec::new();
        loop {
            if self.at_pipe() {
                return Err(ParseError::EmptyBeforePipe);
            }
            stages.push(self.parse_command()?);

            if !self.at_pipe() {
                break;
            }
            self.consume(); // the '|'
            if self.peek().is_none() {
                return Err(ParseError::EmptyAfterPipe);
            }
        }
        Ok(stages)
    }

    /// Parse one segment: any mix of assignments and words up to a pipe or the end.
    fn parse_command(&mut self) -> Result<Command, ParseError> {
        let mut command = Command::default();

        while let Some(kind) = self.peek().map(|t| t.kind) {
            match kind {
                TokenKind::Pipe => break,
                TokenKind::Assign => {
                    let assignment = self.parse_assignment()?;
                    command.assignments.push(assignment);
                }
                _ => {
                    let Some(token) = self.consume() else { break };
                    if command.name.is_empty() {
                        command.name = token.text;
                    } else {
                        command.args.push(Self::token_to_argument(token)?);
                    }
                }
            }
        }

        if command.name.is_empty() && command.assignments.is_empty() {
            return Err(ParseError::MissingCommand);
        }
        Ok(command)
    }

    /// Parse an assignment: ASSIGN value
    fn parse_assignment(&mut self) -> Result<Assignment, ParseError> {
        let name = match self.consume() {
            Some(token) => token.text,
            None => return Err(ParseError::AssignmentWithoutValue),
        };

        let value = match self.peek() {
            None => return Err(ParseError::AssignmentWithoutValue),
            Some(t) if t.kind == TokenKind::Pipe => {
                return Err(ParseError::AssignmentWithoutValue);
            }
            Some(_) => match self.consume() {
                Some(token) => Self::token_to_argument(token)?,
                None => return Err(ParseError::AssignmentWithoutValue),
            },
        };

        Ok(Assignment { name, value })
    }

    fn token_to_argument(token: Token) -> Result<Argument, ParseError> {
        let quoting = match token.kind {
            TokenKind::Word => Quoting::None,
            TokenKind::SingleQuoted => Quoting::Single,
            TokenKind::DoubleQuoted => Quoting::Double,
            TokenKind::Assign | TokenKind::Pipe => {
                return Err(ParseError::InvalidAssignmentValue);
            }
        };
        Ok(Argument::new(token.text, quoting))
    }
}

/// Build the syntax tree for one line of tokens.
///
/// A single segment comes back as [`Node::Command`]; two or more segments separated by
/// pipes come back as a [`Node::Pipeline`].
///
/// # Errors
/// Returns a [`ParseError`] for empty input, empty pipeline segments, and malformed
/// assignments.
pub fn parse(tokens: Vec<Token>) -> Result<Node, ParseError> {
    AstBuilder::from(tokens).build_ast()
}
