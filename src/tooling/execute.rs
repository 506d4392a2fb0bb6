use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use crate::tooling::prepare::{PreparedCommand, ToolInvoker};
use crate::tooling::ToolKind;

const KILLED_PIPE_DRAIN_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "code", rename_all = "snake_case")]
pub enum ExitStatus {
    Exited(i32),
    DidNotLaunch,
    TimedOut,
    Cancelled,
}

impl ExitStatus {
    pub fn code(self) -> Option<i32> {
        match self {
            Self::Exited(code) => Some(code),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationOutcome {
    pub invocation_id: Uuid,
    pub tool: ToolKind,
    pub target: String,
    pub exit_status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invocation worker {0} stopped without reporting an outcome")]
pub struct WorkerLost(pub Uuid);

/// Pending invocation running on a background task.
///
/// The outcome is delivered exactly once, through [`InvocationHandle::wait`] or
/// [`InvocationHandle::on_complete`]. Dropping the handle does not cancel the process.
#[derive(Debug)]
pub struct InvocationHandle {
    id: Uuid,
    cancel: CancelHandle,
    outcome: oneshot::Receiver<InvocationOutcome>,
}

/// Cloneable cancel switch for one invocation; stays usable after the
/// handle has been consumed by `wait` or `on_complete`.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    requested: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    /// Requests termination. Returns false if the worker already finished or a
    /// cancel was sent before.
    pub fn cancel(&self) -> bool {
        if self.requested.is_closed() {
            return false;
        }
        self.requested.send_if_modified(|requested| {
            if *requested {
                false
            } else {
                *requested = true;
                true
            }
        })
    }
}

impl InvocationHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn cancel(&self) -> bool {
        self.cancel.cancel()
    }

    pub async fn wait(self) -> Result<InvocationOutcome, WorkerLost> {
        let id = self.id;
        self.outcome.await.map_err(|_| WorkerLost(id))
    }

    pub fn on_complete<F>(self, callback: F) -> JoinHandle<()>
    where
        F: FnOnce(Result<InvocationOutcome, WorkerLost>) + Send + 'static,
    {
        tokio::spawn(async move {
            callback(self.wait().await);
        })
    }
}

impl ToolInvoker {
    /// Starts the prepared command on a background task. Must be called from
    /// within a tokio runtime. A zero timeout disables the deadline.
    pub fn execute(&self, prepared: PreparedCommand, timeout: Duration) -> InvocationHandle {
        spawn_invocation(prepared, timeout, ())
    }
}

// `guard` is dropped when the worker finishes, whatever the outcome.
pub(crate) fn spawn_invocation<G>(
    prepared: PreparedCommand,
    timeout: Duration,
    guard: G,
) -> InvocationHandle
where
    G: Send + 'static,
{
    let id = prepared.id;
    let (cancel_tx, cancel_rx) = watch::channel(false);
    let (outcome_tx, outcome_rx) = oneshot::channel();
    tokio::spawn(async move {
        let outcome = run_invocation(prepared, timeout, cancel_rx).await;
        drop(guard);
        let _ = outcome_tx.send(outcome);
    });
    InvocationHandle {
        id,
        cancel: CancelHandle {
            requested: Arc::new(cancel_tx),
        },
        outcome: outcome_rx,
    }
}

async fn run_invocation(
    prepared: PreparedCommand,
    timeout: Duration,
    mut cancel_rx: watch::Receiver<bool>,
) -> InvocationOutcome {
    let started = Instant::now();
    let deadline = (!timeout.is_zero()).then(|| tokio::time::Instant::now() + timeout);
    let mut command = Command::new(prepared.program.as_path());
    command
        .args(prepared.args.iter())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(error) => {
            warn!(
                invocation_id = %prepared.id,
                program = %prepared.program.display(),
                error = %error,
                "tool did not launch"
            );
            let stderr = format!(
                "failed to launch '{}': {error}",
                prepared.program.display()
            );
            return finish(
                &prepared,
                ExitStatus::DidNotLaunch,
                String::new(),
                stderr,
                started,
            );
        }
    };

    let mut stdout = spawn_pipe_reader(child.stdout.take());
    let mut stderr = spawn_pipe_reader(child.stderr.take());

    let mut wait_error = None;
    let mut exit_status = tokio::select! {
        status = child.wait() => match status {
            Ok(status) => ExitStatus::Exited(status.code().unwrap_or(-1)),
            Err(error) => {
                wait_error = Some(format!("failed to wait for tool: {error}"));
                ExitStatus::Exited(-1)
            }
        },
        _ = deadline_reached(deadline) => {
            terminate(&mut child, &prepared).await;
            ExitStatus::TimedOut
        }
        _ = cancel_requested(&mut cancel_rx) => {
            terminate(&mut child, &prepared).await;
            ExitStatus::Cancelled
        }
    };

    // Processes left behind by the tool can hold the pipes open after it exits,
    // so draining still honours the deadline and cancellation.
    match exit_status {
        ExitStatus::Exited(_) => {
            tokio::select! {
                biased;
                _ = drain_pipes(&mut stdout, &mut stderr) => {}
                _ = deadline_reached(deadline) => {
                    warn!(
                        invocation_id = %prepared.id,
                        "tool exited but its output stayed open past the deadline"
                    );
                    exit_status = ExitStatus::TimedOut;
                }
                _ = cancel_requested(&mut cancel_rx) => {
                    exit_status = ExitStatus::Cancelled;
                }
            }
        }
        _ => {
            let _ = tokio::time::timeout(
                KILLED_PIPE_DRAIN_GRACE,
                drain_pipes(&mut stdout, &mut stderr),
            )
            .await;
        }
    }

    let stdout = stdout.take();
    let mut stderr = stderr.take();
    if let Some(message) = wait_error {
        if !stderr.is_empty() && !stderr.ends_with('\n') {
            stderr.push('\n');
        }
        stderr.push_str(message.as_str());
    }

    finish(&prepared, exit_status, stdout, stderr, started)
}

async fn deadline_reached(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending::<()>().await,
    }
}

// Never resolves once every `CancelHandle` is gone.
async fn cancel_requested(cancel_rx: &mut watch::Receiver<bool>) {
    if cancel_rx.wait_for(|requested| *requested).await.is_err() {
        std::future::pending::<()>().await;
    }
}

fn finish(
    prepared: &PreparedCommand,
    exit_status: ExitStatus,
    stdout: String,
    stderr: String,
    started: Instant,
) -> InvocationOutcome {
    let duration = started.elapsed();
    info!(
        invocation_id = %prepared.id,
        tool = %prepared.tool,
        target = prepared.target.as_str(),
        status = ?exit_status,
        duration_ms = duration.as_millis() as u64,
        "tool invocation finished"
    );
    InvocationOutcome {
        invocation_id: prepared.id,
        tool: prepared.tool,
        target: prepared.target.clone(),
        exit_status,
        stdout,
        stderr,
        duration,
        finished_at: Utc::now(),
    }
}

async fn terminate(child: &mut Child, prepared: &PreparedCommand) {
    if let Err(error) = child.kill().await {
        warn!(
            invocation_id = %prepared.id,
            error = %error,
            "failed to terminate tool process"
        );
    }
}

struct PipeReader {
    buffer: Arc<Mutex<Vec<u8>>>,
    task: JoinHandle<()>,
}

impl PipeReader {
    async fn drained(&mut self) {
        let _ = (&mut self.task).await;
    }

    // Whatever was read so far is kept; a reader still blocked is stopped.
    fn take(self) -> String {
        self.task.abort();
        let bytes = self
            .buffer
            .lock()
            .map(|mut buf| std::mem::take(&mut *buf))
            .unwrap_or_default();
        String::from_utf8_lossy(bytes.as_slice()).to_string()
    }
}

async fn drain_pipes(stdout: &mut PipeReader, stderr: &mut PipeReader) {
    tokio::join!(stdout.drained(), stderr.drained());
}

fn spawn_pipe_reader<R>(pipe: Option<R>) -> PipeReader
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let buffer = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&buffer);
    let task = tokio::spawn(async move {
        let Some(mut pipe) = pipe else {
            return;
        };
        let mut chunk = [0u8; 8192];
        loop {
            match pipe.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if let Ok(mut buf) = sink.lock() {
                        buf.extend_from_slice(&chunk[..n]);
                    }
                }
            }
        }
    });
    PipeReader { buffer, task }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn prepared(program: &str, args: &[&str]) -> PreparedCommand {
        PreparedCommand {
            id: Uuid::new_v4(),
            tool: ToolKind::Validate,
            program: PathBuf::from(program),
            args: args.iter().map(|arg| arg.to_string()).collect(),
            output_path: None,
            target: String::from("config.ocio"),
            warnings: Vec::new(),
        }
    }

    #[tokio::test]
    async fn missing_binary_is_an_outcome_not_an_error() {
        let handle = ToolInvoker::default().execute(
            prepared("/definitely/not/here/ociocheck", &[]),
            Duration::from_secs(5),
        );
        let outcome = handle.wait().await.expect("worker should report");
        assert_eq!(outcome.exit_status, ExitStatus::DidNotLaunch);
        assert!(outcome.stderr.contains("/definitely/not/here/ociocheck"));
        assert!(outcome.stdout.is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn captures_exit_code_and_both_streams() {
        let outcome = ToolInvoker::default()
            .execute(
                prepared("/bin/sh", &["-c", "printf 'out'; printf 'err' >&2; exit 3"]),
                Duration::from_secs(10),
            )
            .wait()
            .await
            .expect("worker should report");
        assert_eq!(outcome.exit_status, ExitStatus::Exited(3));
        assert_eq!(outcome.stdout, "out");
        assert_eq!(outcome.stderr, "err");
        assert_eq!(outcome.target, "config.ocio");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn captures_large_output_without_truncation() {
        let outcome = ToolInvoker::default()
            .execute(
                prepared("/bin/sh", &["-c", "i=0; while [ $i -lt 20000 ]; do echo line$i; i=$((i+1)); done"]),
                Duration::from_secs(30),
            )
            .wait()
            .await
            .expect("worker should report");
        assert_eq!(outcome.exit_status, ExitStatus::Exited(0));
        assert_eq!(outcome.stdout.lines().count(), 20000);
        assert!(outcome.stdout.ends_with("line19999\n"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn slow_tool_times_out() {
        let outcome = ToolInvoker::default()
            .execute(
                prepared("/bin/sh", &["-c", "exec sleep 30"]),
                Duration::from_millis(200),
            )
            .wait()
            .await
            .expect("worker should report");
        assert_eq!(outcome.exit_status, ExitStatus::TimedOut);
        assert!(outcome.duration < Duration::from_secs(10));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn cancel_is_distinct_from_timeout() {
        let handle = ToolInvoker::default().execute(
            prepared("/bin/sh", &["-c", "exec sleep 30"]),
            Duration::from_secs(60),
        );
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(handle.cancel());
        assert!(!handle.cancel());
        let outcome = handle.wait().await.expect("worker should report");
        assert_eq!(outcome.exit_status, ExitStatus::Cancelled);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn on_complete_fires_once_with_the_outcome() {
        let (tx, rx) = oneshot::channel();
        ToolInvoker::default()
            .execute(prepared("/bin/sh", &["-c", "echo OK"]), Duration::from_secs(10))
            .on_complete(move |result| {
                let _ = tx.send(result);
            });
        let outcome = rx
            .await
            .expect("callback should fire")
            .expect("worker should report");
        assert_eq!(outcome.exit_status, ExitStatus::Exited(0));
        assert_eq!(outcome.stdout, "OK\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn leftover_child_holding_stdout_does_not_outlive_the_deadline() {
        let outcome = ToolInvoker::default()
            .execute(
                prepared("/bin/sh", &["-c", "sleep 6 & echo hi"]),
                Duration::from_millis(300),
            )
            .wait()
            .await
            .expect("worker should report");
        assert_eq!(outcome.exit_status, ExitStatus::TimedOut);
        assert_eq!(outcome.stdout, "hi\n");
        assert!(outcome.duration < Duration::from_secs(3));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn cancel_reaches_a_tool_whose_output_is_still_open() {
        let handle = ToolInvoker::default().execute(
            prepared("/bin/sh", &["-c", "sleep 6 & echo hi"]),
            Duration::from_secs(60),
        );
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(handle.cancel());
        let outcome = handle.wait().await.expect("worker should report");
        assert_eq!(outcome.exit_status, ExitStatus::Cancelled);
        assert!(outcome.duration < Duration::from_secs(3));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn cancel_still_works_after_registering_a_callback() {
        let handle = ToolInvoker::default().execute(
            prepared("/bin/sh", &["-c", "exec sleep 30"]),
            Duration::from_secs(60),
        );
        let cancel = handle.cancel_handle();
        let (tx, rx) = oneshot::channel();
        handle.on_complete(move |result| {
            let _ = tx.send(result);
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(cancel.cancel());
        assert!(!cancel.clone().cancel());
        let outcome = rx
            .await
            .expect("callback should fire")
            .expect("worker should report");
        assert_eq!(outcome.exit_status, ExitStatus::Cancelled);
        assert!(!cancel.cancel());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn concurrent_invocations_keep_their_own_output() {
        let invoker = ToolInvoker::default();
        let slow = invoker.execute(
            prepared("/bin/sh", &["-c", "sleep 0.2; echo first; exit 4"]),
            Duration::from_secs(10),
        );
        let fast = invoker.execute(
            prepared("/bin/sh", &["-c", "echo second >&2"]),
            Duration::from_secs(10),
        );
        assert_ne!(slow.id(), fast.id());

        let (slow, fast) = tokio::join!(slow.wait(), fast.wait());
        let slow = slow.expect("worker should report");
        let fast = fast.expect("worker should report");
        assert_eq!(slow.exit_status, ExitStatus::Exited(4));
        assert_eq!(slow.stdout, "first\n");
        assert_eq!(slow.stderr, "");
        assert_eq!(fast.exit_status, ExitStatus::Exited(0));
        assert_eq!(fast.stdout, "");
        assert_eq!(fast.stderr, "second\n");
        assert_ne!(slow.invocation_id, fast.invocation_id);
    }
}
