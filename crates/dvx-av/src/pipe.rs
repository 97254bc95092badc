//! Cancellable subprocess handle with guaranteed stderr draining.
//!
//! [`ProcessPipe`] wraps one external tool process and wires its standard
//! streams: stdin and stdout as requested by the caller, stderr always piped
//! and drained into a named log file by a background task. Draining stderr
//! unconditionally matters: a tool whose stderr buffer fills up blocks, and a
//! blocked stage deadlocks the whole pipeline.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use dvx_core::{Error, Result};

/// How the child's stdin is wired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StdinMode {
    Null,
    Piped,
}

/// How the child's stdout is wired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StdoutMode {
    Null,
    Piped,
    /// Redirect stdout straight into the given file.
    File(PathBuf),
}

/// A spawned external tool process.
pub struct ProcessPipe {
    tool: String,
    child: Child,
    stderr_drain: Option<JoinHandle<()>>,
}

impl ProcessPipe {
    /// Spawn `program` with the given stream wiring.
    ///
    /// `log_path` receives everything the child writes to stderr; the file is
    /// kept around for post-mortem diagnosis regardless of the outcome.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Launch`] when the binary is missing or cannot be
    /// executed.
    pub fn spawn(
        tool: &str,
        program: &Path,
        args: &[String],
        stdin: StdinMode,
        stdout: StdoutMode,
        log_path: &Path,
    ) -> Result<Self> {
        tracing::info!(tool, args = %args.join(" "), "spawning");

        let mut cmd = Command::new(program);
        cmd.args(args);
        cmd.kill_on_drop(true);

        cmd.stdin(match stdin {
            StdinMode::Null => Stdio::null(),
            StdinMode::Piped => Stdio::piped(),
        });

        cmd.stdout(match &stdout {
            StdoutMode::Null => Stdio::null(),
            StdoutMode::Piped => Stdio::piped(),
            StdoutMode::File(path) => {
                let file = std::fs::File::create(path)
                    .map_err(|e| Error::launch(tool, format!("cannot open output file: {e}")))?;
                Stdio::from(file)
            }
        });

        cmd.stderr(Stdio::piped());

        let mut child = cmd
            .spawn()
            .map_err(|e| Error::launch(tool, e.to_string()))?;

        let stderr_drain = child.stderr.take().map(|mut stderr| {
            let log_path = log_path.to_path_buf();
            tokio::spawn(async move {
                if let Some(parent) = log_path.parent() {
                    let _ = tokio::fs::create_dir_all(parent).await;
                }
                match tokio::fs::File::create(&log_path).await {
                    Ok(mut file) => {
                        let _ = tokio::io::copy(&mut stderr, &mut file).await;
                    }
                    Err(e) => {
                        tracing::warn!(log = %log_path.display(), "cannot open stderr log: {e}");
                        // Still drain so the child never blocks on stderr.
                        let _ = tokio::io::copy(&mut stderr, &mut tokio::io::sink()).await;
                    }
                }
            })
        });

        Ok(Self {
            tool: tool.to_string(),
            child,
            stderr_drain,
        })
    }

    /// Take the writable end of the child's stdin. Only available once, and
    /// only when spawned with [`StdinMode::Piped`].
    pub fn take_stdin(&mut self) -> Option<ChildStdin> {
        self.child.stdin.take()
    }

    /// Take the readable end of the child's stdout. Only available once, and
    /// only when spawned with [`StdoutMode::Piped`].
    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.child.stdout.take()
    }

    /// Wait for the child to exit.
    ///
    /// If `cancel` fires first, the child is killed and [`Error::Canceled`]
    /// is returned. A non-zero exit maps to [`Error::Tool`].
    pub async fn wait(&mut self, cancel: &CancellationToken) -> Result<ExitStatus> {
        let status = tokio::select! {
            status = self.child.wait() => status?,
            _ = cancel.cancelled() => {
                self.kill().await;
                return Err(Error::Canceled);
            }
        };
        self.finish_stderr().await;
        self.check_status(status)
    }

    /// Wait for the child by polling at a fixed interval.
    ///
    /// Used for long-running remuxes where we want a coarse heartbeat rather
    /// than an edge-triggered wakeup. Cancellation semantics match
    /// [`ProcessPipe::wait`].
    pub async fn wait_polling(
        &mut self,
        interval: Duration,
        cancel: &CancellationToken,
    ) -> Result<ExitStatus> {
        loop {
            if let Some(status) = self.child.try_wait()? {
                self.finish_stderr().await;
                return self.check_status(status);
            }

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = cancel.cancelled() => {
                    self.kill().await;
                    return Err(Error::Canceled);
                }
            }
        }
    }

    /// Kill the child and reap it. Safe to call after the child has exited.
    pub async fn kill(&mut self) {
        let _ = self.child.start_kill();
        let _ = self.child.wait().await;
        self.finish_stderr().await;
    }

    fn check_status(&self, status: ExitStatus) -> Result<ExitStatus> {
        if status.success() {
            Ok(status)
        } else {
            Err(Error::tool(&self.tool, status.code()))
        }
    }

    /// Let the stderr drain task flush the log to completion. The task ends
    /// at stderr EOF, which the child's exit guarantees.
    async fn finish_stderr(&mut self) {
        if let Some(handle) = self.stderr_drain.take() {
            let _ = handle.await;
        }
    }
}
