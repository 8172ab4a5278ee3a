//! Decoder process execution.

use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use conform_core::{ConformError, ExecutionResult, Invocation, Result, SYNTHETIC_EXIT_CODE};

/// How long captured pipes may stay open after the decoder is gone.
///
/// Children of a killed decoder can inherit its stdout; their output is
/// dropped once this elapses.
const PIPE_DRAIN_GRACE: Duration = Duration::from_secs(1);

#[derive(Clone, Copy)]
enum Ending {
    Exited(ExitStatus),
    TimedOut,
    Cancelled,
}

/// Runs one invocation as an external process.
pub struct Executor;

impl Executor {
    /// Run `invocation` to completion, bounded by `timeout`.
    ///
    /// A zero `timeout` disables the limit. stdout and stderr are captured
    /// in memory. A non-zero exit is a normal result; only a process that
    /// cannot be started at all is an error (`Spawn`). On timeout or when
    /// `cancel` flips to `true` the process is killed and reaped, and the
    /// result carries [`SYNTHETIC_EXIT_CODE`].
    pub async fn run(
        invocation: &Invocation,
        timeout: Duration,
        mut cancel: watch::Receiver<bool>,
    ) -> Result<ExecutionResult> {
        let start = Instant::now();

        let mut child = Command::new(&invocation.executable)
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ConformError::Spawn {
                executable: invocation.executable.clone(),
                source,
            })?;

        debug!(
            pid = child.id().unwrap_or_default(),
            command = %invocation.command_line(),
            "spawned decoder"
        );

        let stdout = capture(child.stdout.take());
        let stderr = capture(child.stderr.take());

        let deadline = async {
            if timeout.is_zero() {
                std::future::pending::<()>().await
            } else {
                tokio::time::sleep(timeout).await
            }
        };

        let ending = tokio::select! {
            status = child.wait() => Ending::Exited(status?),
            _ = deadline => Ending::TimedOut,
            _ = cancelled(&mut cancel) => Ending::Cancelled,
        };

        let exit_code = match ending {
            Ending::Exited(status) => status.code().unwrap_or(SYNTHETIC_EXIT_CODE),
            Ending::TimedOut | Ending::Cancelled => {
                if let Err(e) = child.kill().await {
                    warn!(
                        executable = %invocation.executable.display(),
                        error = %e,
                        "failed to kill decoder"
                    );
                }
                SYNTHETIC_EXIT_CODE
            }
        };

        let stdout = drain(stdout).await;
        let stderr = drain(stderr).await;
        let wall_time = start.elapsed();

        let duration_exceeded = matches!(ending, Ending::TimedOut);
        let cancelled = matches!(ending, Ending::Cancelled);
        if duration_exceeded {
            warn!(
                file = %invocation.source_file.display(),
                timeout_ms = timeout.as_millis() as u64,
                "decoder timed out and was killed"
            );
        }

        Ok(ExecutionResult {
            exit_code,
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
            duration_exceeded,
            cancelled,
            wall_time,
        })
    }
}

/// Resolves once `rx` holds `true`. Never resolves if the sender is gone.
pub async fn cancelled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

fn capture<R>(pipe: Option<R>) -> Option<JoinHandle<Vec<u8>>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    pipe.map(|mut pipe| {
        tokio::spawn(async move {
            let mut buf = Vec::new();
            // A read error ends capture; whatever arrived is kept.
            let _ = pipe.read_to_end(&mut buf).await;
            buf
        })
    })
}

async fn drain(handle: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    let Some(mut handle) = handle else {
        return Vec::new();
    };
    match tokio::time::timeout(PIPE_DRAIN_GRACE, &mut handle).await {
        Ok(Ok(buf)) => buf,
        Ok(Err(_)) => Vec::new(),
        Err(_) => {
            handle.abort();
            Vec::new()
        }
    }
}
