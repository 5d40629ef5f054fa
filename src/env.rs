use std::collections::{BTreeMap, HashMap};
use std::env as stdenv;
use std::ops::Deref;

/// Two-tier variable store shared by the expander and the executor.
///
/// The environment contains:
/// - `global`: a snapshot of the variables the process inherited. Never written after
///   construction.
/// - `local`: session-scoped variables set by the user. They shadow `global`.
///
/// [`Environment::set`] always writes `local`, [`Environment::unset`] only removes from
/// `local`, so after an unset a lookup falls through to the inherited value again.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    global: HashMap<String, String>,
    local: HashMap<String, String>,
}

impl Environment {
    /// Capture the current process variables as the global tier.
    pub fn new() -> Self {
        Self::from_globals(stdenv::vars())
    }

    /// Build an environment whose global tier is exactly `vars`.
    pub fn from_globals<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            global: vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
            local: HashMap::new(),
        }
    }

    /// Look a variable up, local tier first.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.local
            .get(name)
            .or_else(|| self.global.get(name))
            .map(String::as_str)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.local.insert(name.into(), value.into());
    }

    /// Remove a session variable. Inherited variables are left untouched.
    pub fn unset(&mut self, name: &str) {
        self.local.remove(name);
    }

    pub fn get_local(&self, name: &str) -> Option<&str> {
        self.local.get(name).map(String::as_str)
    }

    pub fn has_local(&self, name: &str) -> bool {
        self.local.contains_key(name)
    }

    pub fn has_global(&self, name: &str) -> bool {
        self.global.contains_key(name)
    }

    pub fn clear_local(&mut self) {
        self.local.clear();
    }

    /// Session variables sorted by name.
    pub fn locals(&self) -> Vec<(&str, &str)> {
        let mut out: Vec<_> = self
            .local
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        out.sort_unstable();
        out
    }

    /// Merged view handed to builtins and child processes. Local wins.
    pub fn vars(&self) -> HashMap<String, String> {
        let mut all = self.global.clone();
        all.extend(self.local.iter().map(|(k, v)| (k.clone(), v.clone())));
        all
    }

    /// Merged view as `KEY=VALUE` strings, ordered by key.
    pub fn get_all(&self) -> Vec<String> {
        let merged: BTreeMap<&str, &str> = self
            .global
            .iter()
            .chain(self.local.iter())
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        merged.into_iter().map(|(k, v)| format!("{k}={v}")).collect()
    }

    /// Open a scope whose assignments are undone when it is dropped.
    pub fn scope(&mut self) -> AssignmentScope<'_> {
        AssignmentScope {
            env: self,
            saved: Vec::new(),
        }
    }
}

/// What a name looked like before a scoped assignment overwrote it.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Prior {
    Local(String),
    GlobalOnly,
    Absent,
}

/// Guard over an [`Environment`] that records the prior state of every name it sets
/// and restores them, newest first, when dropped.
///
/// Call [`AssignmentScope::persist`] to keep the assignments instead.
pub struct AssignmentScope<'e> {
    env: &'e mut Environment,
    saved: Vec<(String, Prior)>,
}

impl AssignmentScope<'_> {
    pub fn set(&mut self, name: &str, value: &str) {
        let prior = match self.env.get_local(name) {
            Some(old) => Prior::Local(old.to_string()),
            None if self.env.has_global(name) => Prior::GlobalOnly,
            None => Prior::Absent,
        };
        tracing::trace!(name, ?prior, "scoped assignment");
        self.saved.push((name.to_string(), prior));
        self.env.set(name, value);
    }

    /// Keep every assignment made through this scope.
    pub fn persist(mut self) {
        self.saved.clear();
    }
}

impl Deref for AssignmentScope<'_> {
    type Target = Environment;

    fn deref(&self) -> &Environment {
        self.env
    }
}

impl Drop for AssignmentScope<'_> {
    fn drop(&mut self) {
        while let Some((name, prior)) = self.saved.pop() {
            tracing::trace!(%name, ?prior, "restoring");
            match prior {
                Prior::Local(old) => self.env.set(name, old),
                Prior::GlobalOnly | Prior::Absent => self.env.unset(&name),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env_with_home() -> Environment {
        Environment::from_globals([("HOME", "/home/user"), ("PATH", "/bin")])
    }

    #[test]
    fn test_local_shadows_global() {
        let mut env = env_with_home();
        assert_eq!(env.get("HOME"), Some("/home/user"));

        env.set("HOME", "/tmp");
        assert_eq!(env.get("HOME"), Some("/tmp"));
        assert!(env.has_global("HOME"));
        assert_eq!(env.get_local("HOME"), Some("/tmp"));
    }

    #[test]
    fn test_unset_falls_back_to_global() {
        let mut env = env_with_home();
        env.set("HOME", "/tmp");
        env.unset("HOME");
        assert_eq!(env.get("HOME"), Some("/home/user"));

        // unsetting an inherited variable is a no-op
        env.unset("PATH");
        assert_eq!(env.get("PATH"), Some("/bin"));
    }

    #[test]
    fn test_get_all_is_sorted_and_merged() {
        let mut env = env_with_home();
        env.set("PATH", "/usr/bin");
        env.set("A", "1");
        assert_eq!(
            env.get_all(),
            vec!["A=1", "HOME=/home/user", "PATH=/usr/bin"]
        );
        assert_eq!(env.vars().get("PATH").map(String::as_str), Some("/usr/bin"));
        assert_eq!(env.locals(), vec![("A", "1"), ("PATH", "/usr/bin")]);
    }

    #[test]
    fn test_scope_restores_every_prior_state() {
        let mut env = env_with_home();
        env.set("X", "old");
        {
            let mut scope = env.scope();
            scope.set("X", "new");
            scope.set("HOME", "/root");
            scope.set("FRESH", "1");
            assert_eq!(scope.get("X"), Some("new"));
            assert_eq!(scope.get("HOME"), Some("/root"));
        }
        assert_eq!(env.get_local("X"), Some("old"));
        assert!(!env.has_local("HOME"));
        assert_eq!(env.get("HOME"), Some("/home/user"));
        assert_eq!(env.get("FRESH"), None);
    }

    #[test]
    fn test_scope_repeated_name_restores_original() {
        let mut env = Environment::default();
        {
            let mut scope = env.scope();
            scope.set("A", "1");
            scope.set("A", "2");
        }
        assert_eq!(env.get("A"), None);
    }

    #[test]
    fn test_scope_persist_keeps_values() {
        let mut env = Environment::default();
        let mut scope = env.scope();
        scope.set("X", "5");
        scope.persist();
        assert_eq!(env.get("X"), Some("5"));
    }

    #[test]
    fn test_env_reads_from_process_env() {
        let env = Environment::new();
        assert!(env.get("PATH").is_some());
        assert!(env.locals().is_empty());
    }
}
