//! Variable substitution over the syntax tree.
//!
//! Expansion happens once per line, after parsing and before execution. Assignments of a
//! command are visible to the rest of that command while it is being expanded
//! (`X=foo Y=$X` gives `Y=foo`), and are rolled back as soon as the command is done so
//! they never leak into a sibling pipeline stage. The executor applies them again.

use crate::ast::{Argument, Assignment, Command, Node, Pipeline, Quoting};
use crate::env::Environment;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExpandError {
    #[error("unterminated ${{ variable")]
    UnterminatedBrace,
}

/// Substitutes `$NAME` and `${NAME}` references.
#[derive(Debug, Clone, Copy)]
pub struct Expander {
    prefix_fallback: bool,
}

impl Default for Expander {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Expander {
    /// With `prefix_fallback`, an undefined `$NAME` retries with shorter prefixes of
    /// `NAME` (so `$VAR_suffix` can resolve `VAR`). Without it only the full name is
    /// looked up.
    pub fn new(prefix_fallback: bool) -> Self {
        Self { prefix_fallback }
    }

    /// Return a copy of `node` with every substitution performed.
    ///
    /// `env` is only modified temporarily; on return, success or not, it holds exactly
    /// what it held before the call.
    pub fn expand(&self, node: &Node, env: &mut Environment) -> Result<Node, ExpandError> {
        let expanded = match node {
            Node::Command(cmd) => Node::Command(self.expand_command(cmd, env)?),
            Node::Pipeline(pipeline) => Node::Pipeline(Pipeline {
                stages: pipeline
                    .stages
                    .iter()
                    .map(|stage| self.expand_command(stage, env))
                    .collect::<Result<_, _>>()?,
            }),
        };
        tracing::debug!(ast = %expanded, "expanded");
        Ok(expanded)
    }

    fn expand_command(&self, cmd: &Command, env: &mut Environment) -> Result<Command, ExpandError> {
        let mut scope = env.scope();

        let mut assignments = Vec::with_capacity(cmd.assignments.len());
        for assignment in &cmd.assignments {
            let value = self.expand_argument(&assignment.value, &scope)?;
            scope.set(&assignment.name, &value.value);
            assignments.push(Assignment {
                name: assignment.name.clone(),
                value,
            });
        }

        let name = self.expand_str(&cmd.name, &scope)?;
        let args = cmd
            .args
            .iter()
            .map(|arg| self.expand_argument(arg, &scope))
            .collect::<Result<_, _>>()?;

        Ok(Command {
            name,
            args,
            assignments,
        })
    }

    /// Single-quoted arguments are returned verbatim, everything else is scanned.
    pub fn expand_argument(
        &self,
        arg: &Argument,
        env: &Environment,
    ) -> Result<Argument, ExpandError> {
        let value = match arg.quoting {
            Quoting::Single => arg.value.clone(),
            Quoting::Double | Quoting::None => self.expand_str(&arg.value, env)?,
        };
        Ok(Argument::plain(value))
    }

    /// Substitute every unescaped `$` reference in `s`.
    ///
    /// An odd run of backslashes right before `$` escapes it (the last backslash is
    /// dropped). An even run is halved and the `$` is expanded.
    pub fn expand_str(&self, s: &str, env: &Environment) -> Result<String, ExpandError> {
        let mut out = String::with_capacity(s.len());
        let mut i = 0;

        while i < s.len() {
            let Some(offset) = s[i..].find('$') else {
                out.push_str(&s[i..]);
                break;
            };
            let dollar = i + offset;
            let backslashes = s[..dollar].bytes().rev().take_while(|&b| b == b'\\').count();

            if backslashes % 2 == 1 {
                out.push_str(&s[i..(dollar - 1).max(i)]);
                out.push('$');
                i = dollar + 1;
                continue;
            }

            let run_start = (dollar - backslashes).max(i);
            out.push_str(&s[i..run_start]);
            out.extend(std::iter::repeat_n('\\', backslashes / 2));
            i = self.expand_variable(s, dollar, env, &mut out)?;
        }

        Ok(out)
    }

    /// Expand the reference starting at `s[dollar]`, returning where scanning resumes.
    fn expand_variable(
        &self,
        s: &str,
        dollar: usize,
        env: &Environment,
        out: &mut String,
    ) -> Result<usize, ExpandError> {
        let rest = &s.as_bytes()[dollar + 1..];
        match rest.first() {
            Some(b'{') => {
                let start = dollar + 2;
                let close = s[start..]
                    .find('}')
                    .map(|o| start + o)
                    .ok_or(ExpandError::UnterminatedBrace)?;
                out.push_str(env.get(&s[start..close]).unwrap_or_default());
                Ok(close + 1)
            }
            Some(&b) if b.is_ascii_alphabetic() || b == b'_' => {
                let start = dollar + 1;
                let len = rest
                    .iter()
                    .take_while(|b| b.is_ascii_alphanumeric() || **b == b'_')
                    .count();
                let name = &s[start..start + len];
                let (value, used) = self.resolve_name(name, env);
                out.push_str(value);
                Ok(start + used)
            }
            _ => {
                out.push('$');
                Ok(dollar + 1)
            }
        }
    }

    /// Resolve `name`, falling back to ever shorter prefixes when enabled.
    ///
    /// Returns the value and how many bytes of `name` it consumed. An unresolved name
    /// consumes itself entirely and expands to nothing.
    fn resolve_name<'e>(&self, name: &str, env: &'e Environment) -> (&'e str, usize) {
        if let Some(value) = env.get(name) {
            return (value, name.len());
        }
        if self.prefix_fallback {
            for len in (1..name.len()).rev() {
                if let Some(value) = env.get(&name[..len]) {
                    return (value, len);
                }
            }
        }
        ("", name.len())
    }
}
