//! A small interactive shell.
//!
//! A line goes through four stages: [`lexer::tokenize`] splits it into tokens,
//! [`parser::parse`] builds a [`ast::Node`], the [`Expander`] substitutes `$NAME` and
//! `${NAME}` references, and the [`Executor`] runs the result, either as a single
//! command or as a pipeline whose stages run concurrently and are linked by OS pipes.
//!
//! Commands are looked up in a [`Registry`] of builtins first and are otherwise
//! launched as external programs found through `PATH`. Variables live in a two-tier
//! [`Environment`]: the inherited process variables and the session's own.
//!
//! The main entry point is [`Interpreter`], which owns the environment and the
//! registry and evaluates one line at a time.

pub mod ast;
mod builtin;
pub mod command;
pub mod config;
pub mod env;
pub mod executor;
pub mod expander;
pub mod external;
mod interpreter;
mod io_adapters;
pub mod lexer;
pub mod parser;

pub use builtin::{Echo, Exit};
pub use command::{Builtin, ExitCode, Registry, Streams};
pub use config::Config;
pub use env::Environment;
pub use executor::{ExecError, Executor};
pub use expander::Expander;
pub use interpreter::{Interpreter, ShellError};
pub use io_adapters::{MemBuffer, MemReader, MemWriter};
