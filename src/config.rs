use std::path::PathBuf;

/// Settings of an [`Interpreter`](crate::Interpreter) session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Printed before every line read by the REPL.
    pub prompt: String,
    /// Where REPL history is loaded from and appended to. `None` keeps it in memory.
    pub history: Option<PathBuf>,
    /// Let an undefined `$NAME` fall back to its longest defined prefix.
    pub prefix_fallback: bool,
}

impl Config {
    pub const DEFAULT_PROMPT: &'static str = "> ";
    pub const HISTORY_FILE: &'static str = ".shell_interpreter_history";

    /// History file under `home`, when there is one.
    pub fn default_history(home: Option<&str>) -> Option<PathBuf> {
        home.filter(|h| !h.is_empty())
            .map(|h| PathBuf::from(h).join(Self::HISTORY_FILE))
    }
}

impl Default for Config {
    fn default() -> Self {
        let home = std::env::var("HOME").ok();
        Self {
            prompt: Self::DEFAULT_PROMPT.to_string(),
            history: Self::default_history(home.as_deref()),
            prefix_fallback: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_history_location() {
        assert_eq!(
            Config::default_history(Some("/home/u")),
            Some(PathBuf::from("/home/u/.shell_interpreter_history"))
        );
        assert_eq!(Config::default_history(Some("")), None);
        assert_eq!(Config::default_history(None), None);
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.prompt, "> ");
        assert!(config.prefix_fallback);
    }
}
