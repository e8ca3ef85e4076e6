use std::io::{self, Read};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::Duration;

use thiserror::Error;
use tracing::debug;
use wait_timeout::ChildExt;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("program not found")]
    NotFound,

    #[error("timed out after {0:?}")]
    TimedOut(Duration),

    #[error("exited with {0}")]
    Failed(ExitStatus),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Runs `cmd` to completion, capturing stdout. The child is killed once
/// `timeout` elapses.
pub fn run_with_timeout(mut cmd: Command, timeout: Duration) -> Result<Vec<u8>, ToolError> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null());
    let mut child = spawn(&mut cmd)?;

    // Drain stdout on a side thread so a chatty child cannot fill the pipe
    // and stall before exiting.
    let reader = child.stdout.take().map(|mut out| {
        std::thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = out.read_to_end(&mut buf);
            buf
        })
    });

    // On timeout the reader is left detached: a grandchild may still hold
    // the pipe open.
    let status = wait_or_kill(&mut child, timeout)?;
    let stdout = reader
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default();
    if !status.success() {
        return Err(ToolError::Failed(status));
    }
    Ok(stdout)
}

/// Runs `cmd` with all standard streams detached and waits at most
/// `timeout` for it to exit successfully.
pub fn launch_with_timeout(mut cmd: Command, timeout: Duration) -> Result<(), ToolError> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    let mut child = spawn(&mut cmd)?;
    let status = wait_or_kill(&mut child, timeout)?;
    if !status.success() {
        return Err(ToolError::Failed(status));
    }
    Ok(())
}

fn spawn(cmd: &mut Command) -> Result<Child, ToolError> {
    cmd.spawn().map_err(|err| match err.kind() {
        io::ErrorKind::NotFound => ToolError::NotFound,
        _ => ToolError::Io(err),
    })
}

fn wait_or_kill(child: &mut Child, timeout: Duration) -> Result<ExitStatus, ToolError> {
    match child.wait_timeout(timeout) {
        Ok(Some(status)) => Ok(status),
        Ok(None) => {
            debug!(pid = child.id(), ?timeout, "killing hung child process");
            let _ = child.kill();
            let _ = child.wait();
            Err(ToolError::TimedOut(timeout))
        }
        Err(err) => {
            let _ = child.kill();
            let _ = child.wait();
            Err(ToolError::Io(err))
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_hung_child_is_killed() {
        let mut cmd = Command::new("sleep");
        cmd.arg("10");
        let started = Instant::now();
        let err = run_with_timeout(cmd, Duration::from_millis(200)).unwrap_err();
        assert!(matches!(err, ToolError::TimedOut(_)));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_stdout_is_captured() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "printf hello"]);
        let out = run_with_timeout(cmd, Duration::from_secs(5)).unwrap();
        assert_eq!(out, b"hello");
    }

    #[test]
    fn test_non_zero_exit_is_failure() {
        let cmd = Command::new("false");
        let err = launch_with_timeout(cmd, Duration::from_secs(5)).unwrap_err();
        assert!(matches!(err, ToolError::Failed(_)));
    }

    #[test]
    fn test_missing_program_is_not_found() {
        let cmd = Command::new("reelpick-no-such-program-here");
        let err = launch_with_timeout(cmd, Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, ToolError::NotFound));
    }
}
