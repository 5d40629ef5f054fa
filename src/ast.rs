//! Syntax tree produced by the parser and rewritten by the expander.

use std::fmt;

/// How an argument was quoted on the command line.
///
/// Determines whether the expander substitutes variables into it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Quoting {
    #[default]
    None,
    Single,
    Double,
}

/// A command argument (or assignment value) together with its quoting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Argument {
    pub value: String,
    pub quoting: Quoting,
}

impl Argument {
    pub fn new(value: impl Into<String>, quoting: Quoting) -> Self {
        Self {
            value: value.into(),
            quoting,
        }
    }

    pub fn plain(value: impl Into<String>) -> Self {
        Self::new(value, Quoting::None)
    }
}

impl fmt::Display for Argument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.quoting {
            Quoting::None => f.write_str(&self.value),
            Quoting::Single => write!(f, "'{}'", self.value),
            Quoting::Double => write!(f, "\"{}\"", self.value),
        }
    }
}

/// A `NAME=value` binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub name: String,
    pub value: Argument,
}

impl fmt::Display for Assignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.value)
    }
}

/// A simple command: optional assignments, a name and its arguments.
///
/// A command with assignments and nothing else (no name, no arguments) is a
/// *standalone assignment*: it only updates the environment. The parser never builds
/// a command with neither a name nor an assignment.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Command {
    pub name: String,
    pub args: Vec<Argument>,
    pub assignments: Vec<Assignment>,
}

impl Command {
    pub fn is_standalone_assignment(&self) -> bool {
        self.name.is_empty() && self.args.is_empty() && !self.assignments.is_empty()
    }

    /// Argument values in order, ready to become an argv tail.
    pub fn arg_values(&self) -> Vec<String> {
        self.args.iter().map(|a| a.value.clone()).collect()
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut words = self
            .assignments
            .iter()
            .map(ToString::to_string)
            .chain((!self.name.is_empty()).then(|| self.name.clone()))
            .chain(self.args.iter().map(ToString::to_string));
        if let Some(first) = words.next() {
            f.write_str(&first)?;
            for w in words {
                write!(f, " {w}")?;
            }
        }
        Ok(())
    }
}

/// Commands connected by `|`, in execution order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
    pub stages: Vec<Command>,
}

impl fmt::Display for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, stage) in self.stages.iter().enumerate() {
            if i > 0 {
                f.write_str(" | ")?;
            }
            write!(f, "{stage}")?;
        }
        Ok(())
    }
}

/// Root of a parsed line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Command(Command),
    Pipeline(Pipeline),
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Command(c) => c.fmt(f),
            Node::Pipeline(p) => p.fmt(f),
        }
    }
}
