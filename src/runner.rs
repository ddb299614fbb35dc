//! External command execution with captured output and timeout enforcement.
//!
//! Every git invocation and every restart command goes through
//! [`CommandRunner::run`]. A non-zero exit is not an error at this layer: the
//! outcome is always reported as a [`CommandResult`] the caller inspects, so
//! stderr stays available for diagnosis. The runner itself never logs;
//! callers own the operational log entries for their invocations.

use std::ffi::OsStr;
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::process::Command;
use tracing::debug;

/// Marker written into stderr when a command is killed for exceeding its
/// allotted duration.
pub const TIMEOUT_MARKER: &str = "command timed out";

/// Outcome of a single external command invocation.
#[derive(Debug, Clone, Serialize)]
pub struct CommandResult {
    /// Exit code, if the process exited normally. `None` for signal death,
    /// spawn failures, and timeout kills.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    /// Wall-clock duration of the invocation.
    pub duration_ms: u64,
    /// True exactly when the process exited with code 0.
    pub success: bool,
    /// True when the command was killed for exceeding its timeout.
    pub timed_out: bool,
}

impl CommandResult {
    /// Short human-readable status for log lines and error messages.
    pub fn status_label(&self) -> String {
        if self.timed_out {
            "timed out".to_string()
        } else {
            match self.exit_code {
                Some(code) => format!("exit code {code}"),
                None => "terminated without exit code".to_string(),
            }
        }
    }
}

/// Spawns external processes with piped stdout/stderr and a hard timeout.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandRunner;

impl CommandRunner {
    pub fn new() -> Self {
        Self
    }

    /// Run `argv` in `working_dir`, waiting at most `timeout`.
    ///
    /// stdout and stderr are captured separately and trimmed. Failures of
    /// every kind (non-zero exit, missing binary, signal death, timeout)
    /// are reported through the returned [`CommandResult`], never as a panic
    /// or error; the `success` flag and `exit_code` carry the distinction.
    pub async fn run<S: AsRef<OsStr>>(
        &self,
        argv: &[S],
        working_dir: &Path,
        timeout: Duration,
    ) -> CommandResult {
        let started = Instant::now();

        let Some((program, args)) = argv.split_first() else {
            return CommandResult {
                exit_code: None,
                stdout: String::new(),
                stderr: "empty command line".to_string(),
                duration_ms: 0,
                success: false,
                timed_out: false,
            };
        };

        let mut command = Command::new(program);
        command
            .args(args)
            .current_dir(working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                return CommandResult {
                    exit_code: None,
                    stdout: String::new(),
                    stderr: format!(
                        "failed to spawn '{}': {e}",
                        program.as_ref().to_string_lossy()
                    ),
                    duration_ms: elapsed_ms(started),
                    success: false,
                    timed_out: false,
                };
            }
        };

        // The child is killed on drop, so abandoning the wait future on
        // timeout also reaps the process.
        match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => {
                let result = CommandResult {
                    exit_code: output.status.code(),
                    stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
                    stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
                    duration_ms: elapsed_ms(started),
                    success: output.status.success(),
                    timed_out: false,
                };
                debug!(
                    program = %program.as_ref().to_string_lossy(),
                    status = %result.status_label(),
                    duration_ms = result.duration_ms,
                    "command finished"
                );
                result
            }
            Ok(Err(e)) => CommandResult {
                exit_code: None,
                stdout: String::new(),
                stderr: format!("failed waiting for command: {e}"),
                duration_ms: elapsed_ms(started),
                success: false,
                timed_out: false,
            },
            Err(_) => CommandResult {
                exit_code: None,
                stdout: String::new(),
                stderr: format!("{TIMEOUT_MARKER} after {}ms", timeout.as_millis()),
                duration_ms: elapsed_ms(started),
                success: false,
                timed_out: true,
            },
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}
