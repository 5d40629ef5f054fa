use std::collections::HashMap;
use std::io::{Read, Write};
use std::process::Stdio;

/// Conventional process exit code type used by this crate.
///
/// A value of 0 indicates success; any non-zero value indicates failure.
/// This mirrors the convention used by POSIX shells and many command-line tools.
pub type ExitCode = i32;

/// Abstraction over a readable input stream that can also be converted into
/// a [`Stdio`] handle for spawning external processes.
///
/// Implementors typically wrap standard input or a pipe. A blanket implementation
/// exists for any type that implements `Read + Send` and `Into<Stdio>`
/// (e.g. [`std::io::PipeReader`]).
pub trait Stdin: Read + Send {
    /// Convert this input into a [`Stdio`] handle suitable for `std::process::Command`.
    fn stdio(self: Box<Self>) -> Stdio;
}

impl<T: Read + Send + Into<Stdio>> Stdin for T {
    fn stdio(self: Box<Self>) -> Stdio {
        (*self).into()
    }
}

/// Abstraction over a writable output stream that can also be converted into
/// a [`Stdio`] handle for spawning external processes.
///
/// A blanket implementation exists for any type that implements `Write + Send` and
/// `Into<Stdio>` (e.g. [`std::io::PipeWriter`]).
pub trait Stdout: Write + Send {
    /// Convert this output into a [`Stdio`] handle suitable for `std::process::Command`.
    fn stdio(self: Box<Self>) -> Stdio;
}

impl<T: Write + Send + Into<Stdio>> Stdout for T {
    fn stdio(self: Box<Self>) -> Stdio {
        (*self).into()
    }
}

/// The process's own standard input, handed to children as `Stdio::inherit()`.
pub struct InheritedStdin(pub std::io::Stdin);

impl Read for InheritedStdin {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.0.read(buf)
    }
}

impl Stdin for InheritedStdin {
    fn stdio(self: Box<Self>) -> Stdio {
        Stdio::inherit()
    }
}

/// The process's own standard output, handed to children as `Stdio::inherit()`.
pub struct InheritedStdout(pub std::io::Stdout);

impl Write for InheritedStdout {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.0.flush()
    }
}

impl Stdout for InheritedStdout {
    fn stdio(self: Box<Self>) -> Stdio {
        // anything a builtin buffered must land before the child writes
        let _ = self.0.lock().flush();
        Stdio::inherit()
    }
}

/// Input and output a command or pipeline runs with.
///
/// Standard error is never redirected: every command writes to the process's stderr.
pub struct Streams {
    pub stdin: Box<dyn Stdin>,
    pub stdout: Box<dyn Stdout>,
}

impl Streams {
    pub fn new(stdin: impl Stdin + 'static, stdout: impl Stdout + 'static) -> Self {
        Self {
            stdin: Box::new(stdin),
            stdout: Box::new(stdout),
        }
    }

    /// The real standard input and output of this process.
    pub fn inherited() -> Self {
        Self::new(
            InheritedStdin(std::io::stdin()),
            InheritedStdout(std::io::stdout()),
        )
    }
}

/// In-process command implementation.
///
/// Builtins report failure through their exit code; they never return errors to the
/// executor. The registry shares one instance across concurrently running pipeline
/// stages, hence `Send + Sync`.
pub trait Builtin: Send + Sync {
    /// Name the command is invoked by, e.g. "echo".
    fn name(&self) -> &'static str;

    /// Run with the expanded arguments (without the command name) and a read-only
    /// view of the environment.
    fn execute(
        &self,
        args: &[String],
        env: &HashMap<String, String>,
        stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        stderr: &mut dyn Write,
    ) -> ExitCode;
}

/// Name to builtin lookup table, populated once at startup.
///
/// [`Registry::default`] holds the shell's standard builtins.
pub struct Registry {
    builtins: HashMap<&'static str, Box<dyn Builtin>>,
}

impl Registry {
    /// An empty registry: every command resolves to an external program.
    pub fn new() -> Self {
        Self {
            builtins: HashMap::new(),
        }
    }

    /// Register `builtin`, replacing any builtin with the same name.
    pub fn register(&mut self, builtin: Box<dyn Builtin>) {
        self.builtins.insert(builtin.name(), builtin);
    }

    pub fn get(&self, name: &str) -> Option<&dyn Builtin> {
        self.builtins.get(name).map(|b| b.as_ref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.builtins.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.builtins.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Answer;

    impl Builtin for Answer {
        fn name(&self) -> &'static str {
            "answer"
        }

        fn execute(
            &self,
            _args: &[String],
            _env: &HashMap<String, String>,
            _stdin: &mut dyn Read,
            stdout: &mut dyn Write,
            _stderr: &mut dyn Write,
        ) -> ExitCode {
            match writeln!(stdout, "42") {
                Ok(()) => 0,
                Err(_) => 1,
            }
        }
    }

    #[test]
    fn test_registry_lookup() {
        let mut registry = Registry::new();
        assert!(registry.get("answer").is_none());

        registry.register(Box::new(Answer));
        assert!(registry.contains("answer"));
        assert_eq!(registry.names(), vec!["answer"]);

        let mut out = Vec::new();
        let code = registry.get("answer").unwrap().execute(
            &[],
            &HashMap::new(),
            &mut std::io::empty(),
            &mut out,
            &mut std::io::sink(),
        );
        assert_eq!(code, 0);
        assert_eq!(out, b"42\n");
    }
}
