//! Out-of-process execution of the predictor binary.
//!
//! One [`RunSpec`] describes one invocation: program, argv, environment
//! overlay, working directory, and a wall-clock budget. Output is streamed
//! line by line over a channel so callers can persist logs while the child
//! is still running. A nonzero exit status is a normal outcome here, not an
//! error; callers decide what it means.

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::error::RunError;

/// Which pipe a log line arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogStream {
    /// The child's standard output.
    Stdout,
    /// The child's standard error.
    Stderr,
}

impl std::fmt::Display for LogStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogStream::Stdout => write!(f, "stdout"),
            LogStream::Stderr => write!(f, "stderr"),
        }
    }
}

/// One line of child output, tagged with its stream.
#[derive(Debug, Clone)]
pub struct LogLine {
    /// Pipe the line arrived on.
    pub stream: LogStream,
    /// Line content without the trailing newline.
    pub line: String,
}

/// Description of one external-binary invocation.
#[derive(Debug, Clone)]
pub struct RunSpec {
    /// Program to execute.
    pub program: PathBuf,
    /// Arguments, in order.
    pub args: Vec<OsString>,
    /// Environment variables layered over the inherited environment.
    pub env: Vec<(String, String)>,
    /// Working directory for the child, if different from the parent's.
    pub cwd: Option<PathBuf>,
    /// Wall-clock budget. The child is killed when it runs out.
    pub timeout: Duration,
    /// Pause between the kill request and a forced reap.
    pub kill_grace: Duration,
}

/// Outcome of a completed (not killed) invocation.
#[derive(Debug, Clone, Copy)]
pub struct RunOutcome {
    /// Exit code; `-1` when the child died to a signal.
    pub exit_code: i32,
    /// Wall-clock time from spawn to exit.
    pub duration: Duration,
}

/// Runs the child, streaming every output line into `log_tx`.
///
/// The run ends in one of four ways: the child exits (any status), the
/// budget expires, `cancel` fires, or the spawn itself fails. A dropped
/// (never fired) cancel sender does not cancel the run.
///
/// # Errors
///
/// Returns [`RunError::Launch`] when the child cannot be spawned,
/// [`RunError::Timeout`] when the budget expires, and
/// [`RunError::Cancelled`] when the cancel channel fires. In the latter two
/// cases the child has been killed before the function returns.
pub async fn run_streamed(
    spec: &RunSpec,
    log_tx: mpsc::Sender<LogLine>,
    cancel: oneshot::Receiver<()>,
) -> Result<RunOutcome, RunError> {
    let started = Instant::now();
    let mut command = Command::new(&spec.program);
    command
        .args(&spec.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    for (key, value) in &spec.env {
        command.env(key, value);
    }
    if let Some(cwd) = &spec.cwd {
        command.current_dir(cwd);
    }

    debug!(program = %spec.program.display(), args = ?spec.args, "spawning predictor");
    let mut child = command.spawn().map_err(|source| RunError::Launch {
        program: spec.program.display().to_string(),
        source,
    })?;

    let stdout_task = child
        .stdout
        .take()
        .map(|stdout| spawn_line_reader(stdout, LogStream::Stdout, log_tx.clone()));
    let stderr_task = child
        .stderr
        .take()
        .map(|stderr| spawn_line_reader(stderr, LogStream::Stderr, log_tx.clone()));
    drop(log_tx);

    // A dropped sender means "no cancellation possible", not "cancel now".
    let cancel_fired = async move {
        match cancel.await {
            Ok(()) => (),
            Err(_) => std::future::pending().await,
        }
    };
    tokio::pin!(cancel_fired);

    let result = tokio::select! {
        status = child.wait() => match status {
            Ok(status) => Ok(RunOutcome {
                exit_code: status.code().unwrap_or(-1),
                duration: started.elapsed(),
            }),
            Err(source) => Err(RunError::Launch {
                program: spec.program.display().to_string(),
                source,
            }),
        },
        () = tokio::time::sleep(spec.timeout) => {
            warn!(
                program = %spec.program.display(),
                timeout_secs = spec.timeout.as_secs(),
                "predictor exceeded budget, killing"
            );
            stop_child(&mut child, spec.kill_grace).await;
            Err(RunError::Timeout {
                timeout_secs: spec.timeout.as_secs(),
            })
        }
        () = &mut cancel_fired => {
            debug!(program = %spec.program.display(), "run cancelled, killing child");
            stop_child(&mut child, spec.kill_grace).await;
            Err(RunError::Cancelled)
        }
    };

    // Let the readers forward whatever the child already wrote.
    if let Some(task) = stdout_task {
        let _ = task.await;
    }
    if let Some(task) = stderr_task {
        let _ = task.await;
    }

    result
}

/// Runs the child to completion, collecting both streams in memory.
///
/// Used by the foreground (synchronous) prediction paths, where the caller
/// wants the whole report at once and no cancellation handle.
///
/// # Errors
///
/// Same failure modes as [`run_streamed`], minus cancellation.
pub async fn run_captured(spec: &RunSpec) -> Result<CapturedRun, RunError> {
    let (log_tx, mut log_rx) = mpsc::channel(256);
    let (_cancel_tx, cancel_rx) = oneshot::channel();

    let run = run_streamed(spec, log_tx, cancel_rx);
    tokio::pin!(run);

    let mut stdout = String::new();
    let mut stderr = String::new();
    let mut outcome = None;
    loop {
        tokio::select! {
            line = log_rx.recv() => match line {
                Some(LogLine { stream: LogStream::Stdout, line }) => {
                    stdout.push_str(&line);
                    stdout.push('\n');
                }
                Some(LogLine { stream: LogStream::Stderr, line }) => {
                    stderr.push_str(&line);
                    stderr.push('\n');
                }
                None => break,
            },
            result = &mut run, if outcome.is_none() => {
                outcome = Some(result);
            }
        }
    }
    let result = match outcome {
        Some(result) => result,
        None => run.await,
    };
    let run_outcome = result?;
    Ok(CapturedRun {
        exit_code: run_outcome.exit_code,
        duration: run_outcome.duration,
        stdout,
        stderr,
    })
}

/// Outcome of [`run_captured`].
#[derive(Debug, Clone)]
pub struct CapturedRun {
    /// Exit code; `-1` when the child died to a signal.
    pub exit_code: i32,
    /// Wall-clock time from spawn to exit.
    pub duration: Duration,
    /// Everything the child wrote to stdout.
    pub stdout: String,
    /// Everything the child wrote to stderr.
    pub stderr: String,
}

fn spawn_line_reader<R>(
    reader: R,
    stream: LogStream,
    tx: mpsc::Sender<LogLine>,
) -> tokio::task::JoinHandle<()>
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if tx.send(LogLine { stream, line }).await.is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    debug!(stream = %stream, error = %err, "log pipe closed unexpectedly");
                    break;
                }
            }
        }
    })
}

/// Kills the child and waits up to `grace` for it to be reaped, then forces
/// a blocking reap so no zombie outlives the call.
async fn stop_child(child: &mut Child, grace: Duration) {
    if let Err(err) = child.start_kill() {
        // Already exited between select and kill.
        debug!(error = %err, "kill request failed");
    }
    match tokio::time::timeout(grace, child.wait()).await {
        Ok(Ok(status)) => {
            debug!(status = ?status.code(), "child reaped after kill");
        }
        Ok(Err(err)) => {
            warn!(error = %err, "failed to reap killed child");
        }
        Err(_) => {
            warn!(grace_secs = grace.as_secs(), "child did not exit within grace, forcing");
            if let Err(err) = child.kill().await {
                warn!(error = %err, "forced kill failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(program: &str, args: &[&str]) -> RunSpec {
        RunSpec {
            program: PathBuf::from(program),
            args: args.iter().map(OsString::from).collect(),
            env: Vec::new(),
            cwd: None,
            timeout: Duration::from_secs(5),
            kill_grace: Duration::from_secs(1),
        }
    }

    #[tokio::test]
    async fn captures_stdout_and_exit_code() {
        let run = run_captured(&spec("echo", &["hello", "world"])).await.unwrap();
        assert_eq!(run.exit_code, 0);
        assert_eq!(run.stdout, "hello world\n");
        assert!(run.stderr.is_empty());
    }

    #[tokio::test]
    async fn missing_program_is_launch_error() {
        let err = run_captured(&spec("/no/such/binary-xyz", &[]))
            .await
            .unwrap_err();
        assert!(matches!(err, RunError::Launch { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn nonzero_exit_is_not_an_error() {
        let run = run_captured(&spec("sh", &["-c", "echo oops >&2; exit 3"]))
            .await
            .unwrap();
        assert_eq!(run.exit_code, 3);
        assert_eq!(run.stderr, "oops\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn timeout_kills_the_child() {
        let mut slow = spec("sleep", &["30"]);
        slow.timeout = Duration::from_millis(100);
        let started = Instant::now();
        let err = run_captured(&slow).await.unwrap_err();
        assert!(matches!(err, RunError::Timeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn cancel_kills_the_child() {
        let (log_tx, mut log_rx) = mpsc::channel(16);
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let slow = spec("sleep", &["30"]);

        let handle = tokio::spawn(async move { run_streamed(&slow, log_tx, cancel_rx).await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel_tx.send(()).unwrap();

        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(err, RunError::Cancelled));
        // Stream is closed once the run ends.
        while log_rx.recv().await.is_some() {}
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn streams_are_tagged() {
        let (log_tx, mut log_rx) = mpsc::channel(16);
        let (_cancel_tx, cancel_rx) = oneshot::channel();
        let spec = spec("sh", &["-c", "echo out; echo err >&2"]);

        let outcome = run_streamed(&spec, log_tx, cancel_rx).await.unwrap();
        assert_eq!(outcome.exit_code, 0);

        let mut saw_out = false;
        let mut saw_err = false;
        while let Some(line) = log_rx.recv().await {
            match line.stream {
                LogStream::Stdout => {
                    assert_eq!(line.line, "out");
                    saw_out = true;
                }
                LogStream::Stderr => {
                    assert_eq!(line.line, "err");
                    saw_err = true;
                }
            }
        }
        assert!(saw_out && saw_err);
    }
}
