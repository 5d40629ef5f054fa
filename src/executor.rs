//! Runs an expanded syntax tree.
//!
//! A pipeline runs every stage at once on its own thread, linked by OS pipes, so a
//! stage producing more output than a pipe holds simply blocks until the next stage
//! reads it. Stages never touch the [`Environment`]: each one gets an owned snapshot
//! of the variables it should see.

use crate::ast::{Command, Node};
use crate::command::{ExitCode, Registry, Stdin, Stdout, Streams};
use crate::env::Environment;
use crate::external::{ExternalError, run_external};
use std::collections::HashMap;
use std::io::Write;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("command {name} exited with code {code}")]
    CommandFailed { name: String, code: ExitCode },
    #[error("external command failed: {0}")]
    External(#[from] ExternalError),
    #[error("empty pipeline")]
    EmptyPipeline,
    #[error("failed to create pipe: {0}")]
    Pipe(#[source] std::io::Error),
    #[error("pipeline stage {0} panicked")]
    StagePanicked(usize),
}

/// Dispatches commands to builtins from a [`Registry`] or to external programs.
pub struct Executor<'r> {
    registry: &'r Registry,
}

impl<'r> Executor<'r> {
    pub fn new(registry: &'r Registry) -> Self {
        Self { registry }
    }

    /// Run `node` with the process's real standard input and output.
    pub fn execute(&self, node: &Node, env: &mut Environment) -> Result<(), ExecError> {
        self.execute_with(node, env, Streams::inherited())
    }

    /// Run `node` reading from `streams.stdin` and writing to `streams.stdout`.
    ///
    /// For a pipeline these are the first stage's input and the last stage's output.
    /// Only a standalone assignment (`X=5`) changes `env` for good; the assignments of a
    /// command are undone when it finishes, whether it succeeded or not.
    ///
    /// External programs can only be wired to streams backed by a file descriptor. An
    /// in-memory stream such as [`MemReader`](crate::MemReader) or
    /// [`MemWriter`](crate::MemWriter) reaches an external stage as `Stdio::null()`, so
    /// its input is empty and its output is discarded. Standard error is never
    /// redirected.
    pub fn execute_with(
        &self,
        node: &Node,
        env: &mut Environment,
        streams: Streams,
    ) -> Result<(), ExecError> {
        match node {
            Node::Command(cmd) => self.execute_command(cmd, env, streams),
            Node::Pipeline(pipeline) => self.execute_pipeline(&pipeline.stages, env, streams),
        }
    }

    fn execute_command(
        &self,
        cmd: &Command,
        env: &mut Environment,
        streams: Streams,
    ) -> Result<(), ExecError> {
        let mut scope = env.scope();
        for assignment in &cmd.assignments {
            scope.set(&assignment.name, &assignment.value.value);
        }

        if cmd.is_standalone_assignment() {
            scope.persist();
            return Ok(());
        }

        let vars = scope.vars();
        self.run_stage(cmd, &vars, streams.stdin, streams.stdout)
    }

    fn execute_pipeline(
        &self,
        stages: &[Command],
        env: &mut Environment,
        streams: Streams,
    ) -> Result<(), ExecError> {
        if stages.is_empty() {
            return Err(ExecError::EmptyPipeline);
        }

        let views: Vec<HashMap<String, String>> = stages
            .iter()
            .map(|stage| {
                let mut scope = env.scope();
                for assignment in &stage.assignments {
                    scope.set(&assignment.name, &assignment.value.value);
                }
                scope.vars()
            })
            .collect();

        let Streams { stdin, stdout } = streams;
        let mut inputs: Vec<Box<dyn Stdin>> = Vec::with_capacity(stages.len());
        let mut outputs: Vec<Box<dyn Stdout>> = Vec::with_capacity(stages.len());
        inputs.push(stdin);
        for _ in 1..stages.len() {
            let (reader, writer) = std::io::pipe().map_err(ExecError::Pipe)?;
            outputs.push(Box::new(writer));
            inputs.push(Box::new(reader));
        }
        outputs.push(stdout);

        let last = stages.len() - 1;
        std::thread::scope(|s| {
            let handles: Vec<_> = stages
                .iter()
                .zip(&views)
                .zip(inputs.into_iter().zip(outputs))
                .enumerate()
                .map(|(i, ((cmd, vars), (stdin, stdout)))| {
                    tracing::debug!(stage = i, command = %cmd, "starting pipeline stage");
                    s.spawn(move || self.run_stage(cmd, vars, stdin, stdout))
                })
                .collect();

            let mut result = Ok(());
            for (i, handle) in handles.into_iter().enumerate() {
                let outcome = handle
                    .join()
                    .unwrap_or_else(|_| Err(ExecError::StagePanicked(i)));
                if i == last {
                    result = outcome;
                } else if let Err(e) = outcome {
                    tracing::debug!(stage = i, error = %e, "ignoring failure of upstream stage");
                }
            }
            result
        })
    }

    /// Run one command to completion, consuming (and so closing) its streams.
    fn run_stage(
        &self,
        cmd: &Command,
        vars: &HashMap<String, String>,
        mut stdin: Box<dyn Stdin>,
        mut stdout: Box<dyn Stdout>,
    ) -> Result<(), ExecError> {
        if cmd.is_standalone_assignment() {
            // inside a pipeline the bindings have nowhere to persist
            return Ok(());
        }

        let args = cmd.arg_values();
        let Some(builtin) = self.registry.get(&cmd.name) else {
            return Ok(run_external(&cmd.name, &args, vars, stdin, stdout)?);
        };

        tracing::debug!(name = %cmd.name, ?args, "running builtin");
        let code = builtin.execute(
            &args,
            vars,
            &mut stdin,
            &mut stdout,
            &mut std::io::stderr(),
        );
        let code = match stdout.flush() {
            Ok(()) => code,
            Err(e) => {
                tracing::warn!(name = %cmd.name, error = %e, "failed to flush builtin output");
                if code == 0 { 1 } else { code }
            }
        };
        if code == 0 {
            Ok(())
        } else {
            Err(ExecError::CommandFailed {
                name: cmd.name.clone(),
                code,
            })
        }
    }
}
