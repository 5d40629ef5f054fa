use crate::command::{ExitCode, Stdin, Stdout};
use std::borrow::Cow;
use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExternalError {
    #[error("command not found: {0}")]
    NotFound(String),
    #[error("failed to spawn: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("failed to wait for child: {0}")]
    Wait(#[source] std::io::Error),
    #[error("{0}")]
    Status(ExitStatus),
}

/// Run `name` as a child process and wait for it.
///
/// `vars` becomes the child's entire environment and supplies the `PATH` used for
/// lookup. Standard error is inherited. A non-zero exit is reported as
/// [`ExternalError::Status`].
pub fn run_external(
    name: &str,
    args: &[String],
    vars: &HashMap<String, String>,
    stdin: Box<dyn Stdin>,
    stdout: Box<dyn Stdout>,
) -> Result<(), ExternalError> {
    let search_paths = vars.get("PATH").map(String::as_str).unwrap_or_default();
    let executable = find_command_path(OsStr::new(search_paths), Path::new(name))
        .ok_or_else(|| ExternalError::NotFound(name.to_string()))?;
    tracing::debug!(name, path = %executable.display(), "resolved external command");

    // The Command holds the parent's copies of the stage's pipe ends; they must be
    // closed before waiting or the neighbouring stages never see EOF.
    let mut child = {
        let mut cmd = std::process::Command::new(executable.as_ref());
        cmd.args(args)
            .env_clear()
            .envs(vars)
            .stdin(stdin.stdio())
            .stdout(stdout.stdio())
            .stderr(Stdio::inherit());
        cmd.spawn().map_err(ExternalError::Spawn)?
    };

    let status = child.wait().map_err(ExternalError::Wait)?;
    tracing::debug!(name, code = exit_code(status), "external command finished");
    if status.success() {
        Ok(())
    } else {
        Err(ExternalError::Status(status))
    }
}

/// Shell-style numeric status: the exit code, or 128 + signal number.
pub fn exit_code(status: ExitStatus) -> ExitCode {
    match status.code() {
        Some(x) => x,
        None => terminated_by_signal(status),
    }
}

#[cfg(unix)]
fn terminated_by_signal(exit_status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    if let Some(signal) = ExitStatusExt::signal(&exit_status) {
        128 + signal
    } else if ExitStatusExt::core_dumped(&exit_status) {
        255
    } else {
        -1
    }
}

#[cfg(not(unix))]
fn terminated_by_signal(_exit_status: ExitStatus) -> i32 {
    -1
}

/// Resolve a command path the way a typical shell would.
///
/// - Absolute path: returned if it exists.
/// - Relative with several components (`bin/sh`) or `./`-prefixed: returned if it
///   exists relative to the current directory.
/// - Single component: the first existing match among the directories of
///   `search_paths` (a `PATH`-style list).
/// - Empty path: `None`.
pub fn find_command_path<'a>(search_paths: &OsStr, path: &'a Path) -> Option<Cow<'a, Path>> {
    if path.is_absolute() {
        return find_by_path(path).map(Cow::Borrowed);
    }

    let search_in_current_dir = cfg!(not(unix)) || path.starts_with("./");
    if search_in_current_dir && path.exists() {
        return Some(Cow::Borrowed(path));
    }

    let mut components = path.components();
    match (components.next(), components.next()) {
        (None, _) => None,
        (Some(x), None) => find_in_path(search_paths, x.as_os_str()).map(Cow::Owned),
        _ => find_by_path(path).map(Cow::Borrowed),
    }
}

fn find_in_path(search_paths: &OsStr, cmd: &OsStr) -> Option<PathBuf> {
    std::env::split_paths(search_paths)
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(|dir| dir.join(cmd))
        .find(|path| path.is_file())
}

fn find_by_path(path: &Path) -> Option<&Path> {
    if path.exists() { Some(path) } else { None }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::tests::lock_current_dir;
    use crate::io_adapters::{MemReader, MemWriter};
    use std::fs;
    use std::fs::File;

    fn osstr(s: &str) -> &OsStr {
        OsStr::new(s)
    }

    fn path_vars() -> HashMap<String, String> {
        HashMap::from([("PATH".to_string(), "/usr/bin:/bin".to_string())])
    }

    #[test]
    #[cfg(unix)]
    fn absolute_existing() {
        let path = Path::new("/bin/sh");
        let found = find_command_path(osstr("/bin"), path).expect("Expected to find /bin/sh");
        assert_eq!(found.as_ref(), path);
    }

    #[test]
    #[cfg(unix)]
    fn absolute_nonexisting() {
        let res = find_command_path(osstr("/bin"), Path::new("/bin/nonexisting"));
        assert!(res.is_none());
    }

    #[test]
    #[cfg(unix)]
    fn single_component_found_in_path() {
        let found = find_command_path(osstr("/nonexistent:/bin"), Path::new("sh"))
            .expect("Expected to find 'sh' in /bin via PATH search");
        assert_eq!(found.as_ref(), Path::new("/bin/sh"));
    }

    #[test]
    #[cfg(unix)]
    fn single_component_not_found_in_path() {
        assert!(find_command_path(osstr("/bin"), Path::new("nonexisting")).is_none());
        assert!(find_command_path(osstr(""), Path::new("sh")).is_none());
    }

    #[test]
    #[cfg(unix)]
    fn relative_paths_resolve_against_current_dir() {
        let _lock = lock_current_dir();
        let cwd_before = std::env::current_dir().expect("cwd");
        let tmp_base =
            std::env::temp_dir().join(format!("external_tests_{}_rel", std::process::id()));
        let _ = fs::remove_dir_all(&tmp_base);
        fs::create_dir_all(tmp_base.join("bin")).expect("create temp bin dir");
        File::create(tmp_base.join("bin").join("tool")).expect("touch bin/tool");
        File::create(tmp_base.join("foo")).expect("touch foo");

        std::env::set_current_dir(&tmp_base).expect("set cwd");
        let nested = find_command_path(osstr("/does/not/matter"), Path::new("bin/tool"))
            .map(Cow::into_owned);
        let dotted = find_command_path(osstr("/bin"), Path::new("./foo")).map(Cow::into_owned);
        std::env::set_current_dir(&cwd_before).ok();

        assert!(nested.expect("bin/tool").ends_with("bin/tool"));
        assert_eq!(dotted.expect("./foo"), Path::new("./foo"));
        let _ = fs::remove_dir_all(tmp_base);
    }

    #[test]
    fn empty_path_is_none() {
        assert!(find_command_path(osstr("/bin"), Path::new("")).is_none());
    }

    #[test]
    #[cfg(unix)]
    fn run_reports_missing_command() {
        let err = run_external(
            "definitely_not_a_command_xyz",
            &[],
            &path_vars(),
            Box::new(MemReader::new("")),
            Box::new(MemWriter::new()),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ExternalError::NotFound(ref n) if n == "definitely_not_a_command_xyz"
        ));
        assert_eq!(err.to_string(), "command not found: definitely_not_a_command_xyz");
    }

    #[test]
    #[cfg(unix)]
    fn run_reports_exit_status() {
        assert!(run_external(
            "true",
            &[],
            &path_vars(),
            Box::new(MemReader::new("")),
            Box::new(MemWriter::new()),
        )
        .is_ok());

        let err = run_external(
            "sh",
            &["-c".to_string(), "exit 3".to_string()],
            &path_vars(),
            Box::new(MemReader::new("")),
            Box::new(MemWriter::new()),
        )
        .unwrap_err();
        let ExternalError::Status(status) = err else {
            panic!("Expected Status error, got {err:?}");
        };
        assert_eq!(exit_code(status), 3);
    }
}
