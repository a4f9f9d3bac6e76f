//! Running external highlighters.
//!
//! Every external colorizer goes through the same lifecycle: locate the
//! executable on the search path, spawn it with piped stdio, write the code to
//! stdin, read stdout to completion, wait, and classify the exit.

use std::ffi::{OsStr, OsString};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::ToolError;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// One external process invocation.
#[derive(Debug, Clone)]
pub struct Invocation<'a> {
    /// Executable name, looked up on `search_path`.
    pub executable: &'a str,
    pub args: Vec<OsString>,
    /// Written to the process's stdin.
    pub input: &'a str,
    /// Directories to search, in `PATH` format. `None` finds nothing.
    pub search_path: Option<&'a OsStr>,
    pub timeout: Option<Duration>,
}

/// Locate `executable` on `search_path`.
///
/// Relative entries in the search path are resolved against the current
/// directory. Nothing is cached: every call sees the path as it is now.
pub fn locate(executable: &str, search_path: Option<&OsStr>) -> Result<PathBuf, ToolError> {
    let not_found = || ToolError::NotFound {
        executable: executable.to_string(),
    };

    let search_path = search_path.filter(|p| !p.is_empty()).ok_or_else(not_found)?;
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));

    which::which_in(executable, Some(search_path), cwd).map_err(|_| not_found())
}

/// Run an invocation and return its stdout.
///
/// With a timeout, the deadline covers the whole exchange: feeding stdin,
/// waiting for exit and draining the output pipes. Pipe threads still busy at
/// the deadline are left behind, since a grandchild may hold the pipes open.
pub fn invoke(invocation: &Invocation<'_>) -> Result<String, ToolError> {
    let executable = invocation.executable;
    let path = locate(executable, invocation.search_path)?;

    debug!(
        executable,
        path = %path.display(),
        args = ?invocation.args,
        "running external highlighter"
    );

    let io_error = |source: io::Error| ToolError::Io {
        executable: executable.to_string(),
        source,
    };
    let timed_out = || ToolError::Timeout {
        executable: executable.to_string(),
        timeout: invocation.timeout.unwrap_or_default(),
    };
    let deadline = invocation.timeout.map(|timeout| Instant::now() + timeout);

    let mut child = spawn(&path, &invocation.args).map_err(io_error)?;

    let stdin = child.stdin.take().map(|pipe| {
        let input = invocation.input.to_owned();
        thread::spawn(move || write_input(pipe, &input))
    });
    let stdout = child.stdout.take().map(|pipe| thread::spawn(move || read_to_string(pipe)));
    let stderr = child.stderr.take().map(|pipe| thread::spawn(move || read_to_string(pipe)));

    let Some(status) = wait(&mut child, deadline).map_err(io_error)? else {
        return Err(timed_out());
    };

    let (Some(written), Some(stdout), Some(stderr)) = (
        join(stdin, deadline),
        join(stdout, deadline),
        join(stderr, deadline),
    ) else {
        return Err(timed_out());
    };

    let stdout = stdout.map_err(io_error)?;
    let stderr = stderr.map_err(io_error)?;

    if !status.success() {
        return Err(ToolError::Failed {
            executable: executable.to_string(),
            code: status.code(),
            stderr,
        });
    }
    written.map_err(io_error)?;

    Ok(stdout)
}

fn spawn(path: &Path, args: &[OsString]) -> io::Result<Child> {
    Command::new(path)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
}

/// Feed the child and close its stdin.
fn write_input(mut pipe: ChildStdin, input: &str) -> io::Result<()> {
    // A highlighter that exits without reading everything closes the pipe
    // early; its exit status tells the real story.
    match pipe.write_all(input.as_bytes()) {
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => Ok(()),
        other => other,
    }
}

/// Wait for the child; `Ok(None)` means it was killed at `deadline`.
fn wait(child: &mut Child, deadline: Option<Instant>) -> io::Result<Option<ExitStatus>> {
    let Some(deadline) = deadline else {
        return child.wait().map(Some);
    };

    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// Join a pipe thread; `None` means it was still running at `deadline`.
fn join<T: Default>(
    handle: Option<JoinHandle<io::Result<T>>>,
    deadline: Option<Instant>,
) -> Option<io::Result<T>> {
    let Some(handle) = handle else {
        return Some(Ok(T::default()));
    };

    if let Some(deadline) = deadline {
        while !handle.is_finished() {
            if Instant::now() >= deadline {
                return None;
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    Some(
        handle
            .join()
            .unwrap_or_else(|_| Err(io::Error::other("pipe thread panicked"))),
    )
}

fn read_to_string<R: Read>(mut pipe: R) -> io::Result<String> {
    let mut buf = Vec::new();
    pipe.read_to_end(&mut buf)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn install(dir: &TempDir, name: &str, script: &str) {
        let path = dir.path().join(name);
        fs::write(&path, format!("#!/bin/sh\n{script}\n")).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    }

    fn invocation<'a>(executable: &'a str, input: &'a str, path: &'a OsStr) -> Invocation<'a> {
        Invocation {
            executable,
            args: vec!["--flag".into(), "value".into()],
            input,
            search_path: Some(path),
            timeout: None,
        }
    }

    #[test]
    fn test_pipes_stdin_to_stdout() {
        let dir = TempDir::new().unwrap();
        install(&dir, "shout", "tr a-z A-Z");

        let path = dir.path().as_os_str();
        let output = invoke(&invocation("shout", "puts 'hi'", path)).unwrap();
        assert_eq!(output, "PUTS 'HI'");
    }

    #[test]
    fn test_passes_arguments() {
        let dir = TempDir::new().unwrap();
        install(&dir, "args", "cat > /dev/null; printf '%s|' \"$@\"");

        let path = dir.path().as_os_str();
        let output = invoke(&invocation("args", "", path)).unwrap();
        assert_eq!(output, "--flag|value|");
    }

    #[test]
    fn test_not_found() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().as_os_str();

        let err = invoke(&invocation("pygmentize", "x", path)).unwrap_err();
        assert!(matches!(err, ToolError::NotFound { ref executable } if executable == "pygmentize"));
    }

    #[test]
    fn test_no_search_path_finds_nothing() {
        let err = locate("sh", None).unwrap_err();
        assert!(matches!(err, ToolError::NotFound { .. }));
        let err = locate("sh", Some(OsStr::new(""))).unwrap_err();
        assert!(matches!(err, ToolError::NotFound { .. }));
    }

    #[test]
    fn test_nonzero_exit_keeps_stderr() {
        let dir = TempDir::new().unwrap();
        install(&dir, "grumpy", "echo 'unknown lexer' >&2; exit 3");

        let path = dir.path().as_os_str();
        let err = invoke(&invocation("grumpy", "code", path)).unwrap_err();
        match err {
            ToolError::Failed { code, stderr, .. } => {
                assert_eq!(code, Some(3));
                assert_eq!(stderr.trim(), "unknown lexer");
            }
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[test]
    fn test_timeout_kills_process() {
        let dir = TempDir::new().unwrap();
        install(&dir, "sleepy", "exec sleep 5");

        let path = dir.path().as_os_str();
        let mut inv = invocation("sleepy", "", path);
        inv.timeout = Some(Duration::from_millis(50));

        let start = Instant::now();
        let err = invoke(&inv).unwrap_err();
        assert!(matches!(err, ToolError::Timeout { .. }));
        assert!(start.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn test_timeout_covers_unread_input() {
        let dir = TempDir::new().unwrap();
        install(&dir, "deaf", "exec sleep 3");

        // Far more than a pipe buffer holds.
        let input = "x".repeat(1024 * 1024);
        let path = dir.path().as_os_str();
        let mut inv = invocation("deaf", &input, path);
        inv.timeout = Some(Duration::from_millis(50));

        let start = Instant::now();
        let err = invoke(&inv).unwrap_err();
        assert!(matches!(err, ToolError::Timeout { .. }), "{err:?}");
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_timeout_does_not_wait_for_grandchildren() {
        let dir = TempDir::new().unwrap();
        // The shell forks `sleep`, which keeps stdout open after the kill.
        install(&dir, "forky", "sleep 3; echo done");

        let path = dir.path().as_os_str();
        let mut inv = invocation("forky", "", path);
        inv.timeout = Some(Duration::from_millis(50));

        let start = Instant::now();
        let err = invoke(&inv).unwrap_err();
        assert!(matches!(err, ToolError::Timeout { .. }), "{err:?}");
        assert!(start.elapsed() < Duration::from_secs(2));
    }
}
