use crate::command::{Builtin, ExitCode, Registry};
use anyhow::{Context, Result};
use argh::{EarlyExit, FromArgs};
use regex::{Regex, RegexBuilder};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::io::{BufRead, BufReader, Read, Write};
use std::marker::PhantomData;
use std::path::Path;

/// Builtins whose arguments are parsed with [`argh`] (`FromArgs`).
///
/// They are adapted to the object-safe [`Builtin`] interface by [`Parsed`], which
/// parses the argument list on every invocation and turns errors into exit codes.
pub(crate) trait BuiltinCommand: Sized + FromArgs {
    /// Canonical name of the command, e.g. "cat" or "cd".
    fn name() -> &'static str;

    /// Executes the command using provided IO streams and environment.
    ///
    /// Return value should follow shell conventions: 0 for success, non-zero for error.
    /// An `Err` is reported on stderr and becomes exit code 1.
    fn execute(
        self,
        stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        stderr: &mut dyn Write,
        env: &HashMap<String, String>,
    ) -> Result<ExitCode>;
}

/// Adapter from a [`BuiltinCommand`] to a registry entry.
pub(crate) struct Parsed<T> {
    _phantom: PhantomData<fn() -> T>,
}

impl<T> Default for Parsed<T> {
    fn default() -> Self {
        Self {
            _phantom: PhantomData,
        }
    }
}

impl<T: BuiltinCommand> Builtin for Parsed<T> {
    fn name(&self) -> &'static str {
        T::name()
    }

    fn execute(
        &self,
        args: &[String],
        env: &HashMap<String, String>,
        stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        stderr: &mut dyn Write,
    ) -> ExitCode {
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        let cmd = match T::from_args(&[T::name()], &args) {
            Ok(cmd) => cmd,
            Err(EarlyExit { output, status }) => {
                return match status {
                    Ok(()) => {
                        let _ = stdout.write_all(output.as_bytes());
                        0
                    }
                    Err(()) => {
                        let _ = stderr.write_all(output.as_bytes());
                        2
                    }
                };
            }
        };

        match cmd.execute(stdin, stdout, stderr, env) {
            Ok(code) => code,
            Err(e) => {
                let _ = writeln!(stderr, "{e:#}");
                1
            }
        }
    }
}

impl Default for Registry {
    /// A registry with the standard builtins:
    /// `cat`, `cd`, `echo`, `exit`, `grep`, `ls`, `pwd`, `wc`.
    fn default() -> Self {
        let mut registry = Registry::new();
        registry.register(Box::new(Echo));
        registry.register(Box::new(Exit));
        registry.register(Box::new(Parsed::<Cat>::default()));
        registry.register(Box::new(Parsed::<Wc>::default()));
        registry.register(Box::new(Parsed::<Pwd>::default()));
        registry.register(Box::new(Parsed::<Cd>::default()));
        registry.register(Box::new(Parsed::<Ls>::default()));
        registry.register(Box::new(Parsed::<Grep>::default()));
        registry
    }
}

/// Write the arguments to standard output, separated by spaces.
///
/// A leading `-n` suppresses the trailing newline. Every other word, dashes included,
/// is printed as-is, so this one does not go through argh.
pub struct Echo;

impl Builtin for Echo {
    fn name(&self) -> &'static str {
        "echo"
    }

    fn execute(
        &self,
        args: &[String],
        _env: &HashMap<String, String>,
        _stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        stderr: &mut dyn Write,
    ) -> ExitCode {
        let (newline, words) = match args.split_first() {
            Some((flag, rest)) if flag == "-n" => (false, rest),
            _ => (true, args),
        };
        let mut line = words.join(" ");
        if newline {
            line.push('\n');
        }
        match stdout.write_all(line.as_bytes()) {
            Ok(()) => 0,
            Err(e) => {
                let _ = writeln!(stderr, "echo: {e}");
                1
            }
        }
    }
}

/// Terminate the whole shell process.
pub struct Exit;

impl Exit {
    /// Status the process exits with for the given arguments.
    ///
    /// No argument means 0; a number is reduced modulo 256 into `0..=255`.
    /// Anything else is rejected with the offending argument.
    pub fn status(args: &[String]) -> Result<i32, String> {
        match args.first() {
            None => Ok(0),
            Some(arg) => arg
                .trim()
                .parse::<i64>()
                .map(|n| n.rem_euclid(256) as i32)
                .map_err(|_| arg.clone()),
        }
    }
}

impl Builtin for Exit {
    fn name(&self) -> &'static str {
        "exit"
    }

    fn execute(
        &self,
        args: &[String],
        _env: &HashMap<String, String>,
        _stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        stderr: &mut dyn Write,
    ) -> ExitCode {
        let _ = stdout.flush();
        let code = match Exit::status(args) {
            Ok(code) => code,
            Err(arg) => {
                let _ = writeln!(stderr, "exit: {arg}: numeric argument required");
                2
            }
        };
        tracing::debug!(code, "exit requested");
        let _ = std::io::stdout().flush();
        std::process::exit(code)
    }
}

#[derive(FromArgs)]
/// print file(s) to stdout
pub struct Cat {
    #[argh(positional, greedy)]
    /// files to print; reads standard input when none are given
    pub files: Vec<String>,
}

impl BuiltinCommand for Cat {
    fn name() -> &'static str {
        "cat"
    }

    fn execute(
        self,
        stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        _stderr: &mut dyn Write,
        _env: &HashMap<String, String>,
    ) -> Result<ExitCode> {
        if self.files.is_empty() {
            std::io::copy(stdin, stdout).context("cat: error reading from stdin")?;
            return Ok(0);
        }
        for fname in &self.files {
            let mut f = fs::File::open(fname).with_context(|| format!("cat: {fname}"))?;
            std::io::copy(&mut f, stdout).with_context(|| format!("cat: {fname}"))?;
        }
        Ok(0)
    }
}

/// Line, word and byte counts of one input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Counts {
    lines: usize,
    words: usize,
    bytes: usize,
}

impl Counts {
    fn of(reader: &mut dyn Read) -> std::io::Result<Self> {
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf)?;
        let text = String::from_utf8_lossy(&buf);
        Ok(Self {
            lines: text.lines().count(),
            words: text.split_whitespace().count(),
            bytes: buf.len(),
        })
    }
}

#[derive(FromArgs)]
/// count lines, words and bytes
pub struct Wc {
    #[argh(positional, greedy)]
    /// files to count; reads standard input when none are given
    pub files: Vec<String>,
}

impl BuiltinCommand for Wc {
    fn name() -> &'static str {
        "wc"
    }

    fn execute(
        self,
        stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        _stderr: &mut dyn Write,
        _env: &HashMap<String, String>,
    ) -> Result<ExitCode> {
        if self.files.is_empty() {
            let c = Counts::of(stdin).context("wc: error reading from stdin")?;
            writeln!(stdout, "{} {} {}", c.lines, c.words, c.bytes)?;
            return Ok(0);
        }
        for fname in &self.files {
            let mut f = fs::File::open(fname).with_context(|| format!("wc: {fname}"))?;
            let c = Counts::of(&mut f).with_context(|| format!("wc: {fname}"))?;
            writeln!(stdout, "{} {} {} {}", c.lines, c.words, c.bytes, fname)?;
        }
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Print the current working directory to standard output.
pub struct Pwd {}

impl BuiltinCommand for Pwd {
    fn name() -> &'static str {
        "pwd"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        _stderr: &mut dyn Write,
        _env: &HashMap<String, String>,
    ) -> Result<ExitCode> {
        let dir = env::current_dir().context("pwd")?;
        writeln!(stdout, "{}", dir.display())?;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Change the current working directory.
/// If no target is provided, changes to the directory specified by the HOME environment variable.
pub struct Cd {
    #[argh(positional, greedy)]
    /// directory to switch to, absolute or relative to the current directory;
    /// defaults to $HOME when omitted
    pub targets: Vec<String>,
}

impl BuiltinCommand for Cd {
    fn name() -> &'static str {
        "cd"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        _stdout: &mut dyn Write,
        stderr: &mut dyn Write,
        env: &HashMap<String, String>,
    ) -> Result<ExitCode> {
        let target = match self.targets.as_slice() {
            [] => match env.get("HOME") {
                Some(home) if !home.is_empty() => home.clone(),
                _ => anyhow::bail!("cd: no target and HOME not set"),
            },
            [target] => target.clone(),
            _ => {
                writeln!(stderr, "cd: too many arguments")?;
                return Ok(1);
            }
        };

        env::set_current_dir(&target).with_context(|| format!("cd: can't chdir to {target}"))?;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// list directory contents
pub struct Ls {
    #[argh(positional, greedy)]
    /// directory (or file) to list; defaults to the current directory
    pub paths: Vec<String>,
}

impl BuiltinCommand for Ls {
    fn name() -> &'static str {
        "ls"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        stderr: &mut dyn Write,
        _env: &HashMap<String, String>,
    ) -> Result<ExitCode> {
        let target = match self.paths.as_slice() {
            [] => ".",
            [path] => path.as_str(),
            _ => {
                writeln!(stderr, "ls: too many arguments")?;
                return Ok(1);
            }
        };

        let path = Path::new(target);
        let meta = match fs::metadata(path) {
            Ok(meta) => meta,
            Err(e) => {
                writeln!(stderr, "ls: {target}: {e}")?;
                return Ok(2);
            }
        };
        if !meta.is_dir() {
            let name = path.file_name().map_or_else(
                || target.to_string(),
                |n| n.to_string_lossy().into_owned(),
            );
            writeln!(stdout, "{name}")?;
            return Ok(0);
        }

        let mut names = fs::read_dir(path)
            .with_context(|| format!("ls: {target}"))?
            .map(|entry| entry.map(|e| e.file_name().to_string_lossy().into_owned()))
            .collect::<std::io::Result<Vec<_>>>()
            .with_context(|| format!("ls: {target}"))?;
        names.sort();
        for name in names {
            writeln!(stdout, "{name}")?;
        }
        Ok(0)
    }
}

#[derive(FromArgs)]
/// print lines matching a pattern
pub struct Grep {
    #[argh(positional)]
    /// the pattern to search for (a regular expression)
    pub pattern: String,

    #[argh(positional, greedy)]
    /// files to search. If none provided, reads from stdin.
    pub files: Vec<String>,

    #[argh(switch, short = 'w')]
    /// match only whole words (the pattern is taken literally)
    pub word_regexp: bool,

    #[argh(switch, short = 'i')]
    /// ignore case distinctions
    pub ignore_case: bool,

    #[argh(option, short = 'A', default = "0")]
    /// print NUM lines of trailing context after matching lines
    pub after_context: usize,
}

impl Grep {
    fn build_regex(&self) -> Result<Regex, regex::Error> {
        let pattern = if self.word_regexp {
            format!(r"\b{}\b", regex::escape(&self.pattern))
        } else {
            self.pattern.clone()
        };
        RegexBuilder::new(&pattern)
            .case_insensitive(self.ignore_case)
            .build()
    }

    /// Print matching lines (plus trailing context) of one source.
    ///
    /// Returns whether anything matched.
    fn process_source(
        &self,
        reader: &mut dyn Read,
        stdout: &mut dyn Write,
        file_name: Option<&str>,
        re: &Regex,
    ) -> Result<bool> {
        let mut reader = BufReader::new(reader);
        let prefix = file_name
            .map(|name| format!("{}:", name))
            .unwrap_or_default();

        let mut found = false;
        let mut context_left = 0;
        let mut last_printed: Option<usize> = None;
        let mut line = Vec::new();

        for line_num in 0.. {
            line.clear();
            if reader.read_until(b'\n', &mut line)? == 0 {
                break;
            }
            let text = String::from_utf8_lossy(&line);
            let body = text.strip_suffix('\n').unwrap_or(&text);

            let print = if re.is_match(body) {
                found = true;
                context_left = self.after_context;
                true
            } else if context_left > 0 {
                context_left -= 1;
                true
            } else {
                false
            };

            if print {
                if self.after_context > 0
                    && last_printed.is_some_and(|last| line_num > last + 1)
                {
                    stdout.write_all(b"--\n")?;
                }
                writeln!(stdout, "{prefix}{body}")?;
                last_printed = Some(line_num);
            }
        }

        Ok(found)
    }
}

impl BuiltinCommand for Grep {
    fn name() -> &'static str {
        "grep"
    }

    fn execute(
        self,
        stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        stderr: &mut dyn Write,
        _env: &HashMap<String, String>,
    ) -> Result<ExitCode> {
        let re = match self.build_regex() {
            Ok(re) => re,
            Err(e) => {
                writeln!(stderr, "grep: invalid regular expression: {e}")?;
                return Ok(2);
            }
        };

        if self.files.is_empty() {
            let found = self.process_source(stdin, stdout, None, &re)?;
            return Ok(if found { 0 } else { 1 });
        }

        let mut found = false;
        let mut failed = false;
        for file_name in &self.files {
            let result = fs::File::open(file_name)
                .map_err(anyhow::Error::from)
                .and_then(|mut f| self.process_source(&mut f, stdout, Some(file_name), &re));
            match result {
                Ok(matched) => found |= matched,
                Err(e) => {
                    writeln!(stderr, "grep: {}: {}", file_name, e)?;
                    failed = true;
                }
            }
        }
        Ok(match (failed, found) {
            (true, _) => 2,
            (false, true) => 0,
            (false, false) => 1,
        })
    }
}
