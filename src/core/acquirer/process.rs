//! Child-process execution with a bounded timeout and SIGTERM-then-SIGKILL
//! cancellation, grounded in the pack's ffmpeg wrapper: stdio piped,
//! stderr captured for the failure record, a timeout wrapping the wait,
//! and an explicit kill step rather than relying on `kill_on_drop`.

use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;

use crate::error::{EpidError, EpidResult};

/// Grace period between SIGTERM and SIGKILL when a process must be torn
/// down (timeout or caller cancellation).
pub const TERMINATE_GRACE: Duration = Duration::from_secs(3);

/// Captured output of a completed child process.
pub struct ProcessOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: String,
}

fn spawn_error(program: &str, err: std::io::Error) -> EpidError {
    if err.kind() == std::io::ErrorKind::NotFound {
        EpidError::environment_missing(format!("{program} not found on PATH: {err}"))
    } else {
        EpidError::extraction_failed(format!("spawning {program}: {err}"))
    }
}

/// Run `program args...`, capturing stdout/stderr, killing the process if
/// it is still running after `timeout_dur` or if `cancellation` fires
/// first (§5: "every long operation accepts a cancellation signal and
/// checks it at every suspension point").
pub async fn run_with_timeout(
    program: &str,
    args: &[String],
    timeout_dur: Duration,
    cancellation: &CancellationToken,
) -> EpidResult<ProcessOutput> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| spawn_error(program, e))?;

    let mut stdout_pipe = child.stdout.take().expect("stdout piped at spawn");
    let mut stderr_pipe = child.stderr.take().expect("stderr piped at spawn");

    let mut stdout_buf = Vec::new();
    let mut stderr_buf = Vec::new();

    let run = async {
        let _ = tokio::join!(
            stdout_pipe.read_to_end(&mut stdout_buf),
            stderr_pipe.read_to_end(&mut stderr_buf),
        );
        child.wait().await
    };

    tokio::select! {
        biased;

        _ = cancellation.cancelled() => {
            terminate(&mut child).await;
            Err(EpidError::Cancelled)
        }
        timed = tokio::time::timeout(timeout_dur, run) => match timed {
            Ok(Ok(status)) => Ok(ProcessOutput {
                status,
                stdout: stdout_buf,
                stderr: String::from_utf8_lossy(&stderr_buf).into_owned(),
            }),
            Ok(Err(e)) => Err(EpidError::extraction_failed(format!("{program}: {e}"))),
            Err(_elapsed) => {
                terminate(&mut child).await;
                Err(EpidError::extraction_failed(format!(
                    "{program} timed out after {timeout_dur:?}"
                )))
            }
        },
    }
}

/// Send SIGTERM, wait up to [`TERMINATE_GRACE`], then SIGKILL.
async fn terminate(child: &mut Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        unsafe {
            libc::kill(pid as i32, libc::SIGTERM);
        }
    }

    if tokio::time::timeout(TERMINATE_GRACE, child.wait())
        .await
        .is_ok()
    {
        return;
    }

    let _ = child.start_kill();
    let _ = child.wait().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_program_is_environment_missing() {
        let err = run_with_timeout(
            "definitely-not-a-real-tool-xyz",
            &[],
            Duration::from_secs(1),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, EpidError::EnvironmentMissing(_)));
    }

    #[tokio::test]
    async fn successful_command_captures_stdout() {
        let output = run_with_timeout(
            "echo",
            &["hello".to_string()],
            Duration::from_secs(5),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert!(output.status.success());
        assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "hello");
    }

    #[tokio::test]
    async fn timeout_kills_a_long_running_process() {
        let err = run_with_timeout(
            "sleep",
            &["5".to_string()],
            Duration::from_millis(100),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, EpidError::ExtractionFailed(_)));
    }

    #[tokio::test]
    async fn cancellation_stops_a_running_process() {
        let token = CancellationToken::new();
        let inner = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            inner.cancel();
        });
        let err = run_with_timeout(
            "sleep",
            &["5".to_string()],
            Duration::from_secs(5),
            &token,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, EpidError::Cancelled));
    }
}
