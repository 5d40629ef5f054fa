use argh::FromArgs;
use shell_interpreter::{Config, Interpreter, Registry};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(FromArgs)]
/// A small interactive shell with pipelines and variables.
struct Args {
    #[argh(option, short = 'c')]
    /// evaluate this line and exit
    command: Option<String>,

    #[argh(option)]
    /// prompt shown before each line
    prompt: Option<String>,

    #[argh(option)]
    /// history file (default: ~/.shell_interpreter_history)
    history: Option<PathBuf>,

    #[argh(switch)]
    /// do not load or save history
    no_history: bool,

    #[argh(switch)]
    /// expand an undefined $NAME to nothing instead of trying shorter prefixes
    posix_vars: bool,
}

impl Args {
    fn into_config(self) -> (Config, Option<String>) {
        let mut config = Config::default();
        if let Some(prompt) = self.prompt {
            config.prompt = prompt;
        }
        if self.history.is_some() {
            config.history = self.history;
        }
        if self.no_history {
            config.history = None;
        }
        config.prefix_fallback = !self.posix_vars;
        (config, self.command)
    }
}

fn main() -> ExitCode {
    // Respects RUST_LOG; stays silent otherwise.
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    let (config, command) = argh::from_env::<Args>().into_config();
    let mut sh = Interpreter::new(config, Registry::default());

    if let Some(line) = command {
        return match sh.eval(&line) {
            Ok(()) => ExitCode::SUCCESS,
            Err(err) => {
                eprintln!("Error: {err}");
                ExitCode::FAILURE
            }
        };
    }

    match sh.repl() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:?}");
            ExitCode::FAILURE
        }
    }
}
