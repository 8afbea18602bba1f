//! # Tool Invocation
//!
//! Runs one external command with stdout and stderr redirected to files,
//! observing a shared cancellation flag while the child is alive.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("empty command line")]
    EmptyCommand,
    #[error("failed to launch {program}: {source}")]
    LaunchFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot open redirect file {}: {source}", path.display())]
    Redirect {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("process exited with status {0}")]
    NonZeroExit(i32),
    #[error("failed waiting on {program}: {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("cancelled")]
    Cancelled,
}

impl ToolError {
    /// True for every variant that means the process never started.
    pub fn is_launch_failure(&self) -> bool {
        matches!(
            self,
            ToolError::EmptyCommand | ToolError::LaunchFailed { .. } | ToolError::Redirect { .. }
        )
    }
}

/// Executes external commands for the pipeline.
pub trait ToolRunner: Send + Sync {
    /// Run `command_line` to completion, succeeding only on exit status 0.
    fn run(
        &self,
        command_line: &[String],
        stdout_path: &Path,
        stderr_path: &Path,
        cancel_flag: &AtomicBool,
    ) -> Result<(), ToolError>;
}

/// [`ToolRunner`] backed by real OS processes.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    poll_interval: Duration,
}

impl ProcessRunner {
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            poll_interval: poll_interval.max(Duration::from_millis(1)),
        }
    }
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new(Duration::from_millis(100))
    }
}

fn create_redirect(path: &Path) -> Result<File, ToolError> {
    File::create(path).map_err(|source| ToolError::Redirect {
        path: path.to_path_buf(),
        source,
    })
}

fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            warn!("process terminated by signal {signal}");
        }
    }
    -1
}

fn kill_and_reap(child: &mut Child, program: &str) {
    if let Err(err) = child.kill() {
        warn!("failed to kill {program}: {err}");
    }
    if let Err(err) = child.wait() {
        warn!("failed to reap {program}: {err}");
    }
}

impl ToolRunner for ProcessRunner {
    fn run(
        &self,
        command_line: &[String],
        stdout_path: &Path,
        stderr_path: &Path,
        cancel_flag: &AtomicBool,
    ) -> Result<(), ToolError> {
        let (program, args) = command_line.split_first().ok_or(ToolError::EmptyCommand)?;
        if cancel_flag.load(Ordering::Relaxed) {
            return Err(ToolError::Cancelled);
        }

        let stdout = create_redirect(stdout_path)?;
        let stderr = create_redirect(stderr_path)?;

        debug!("spawning {}", command_line.join(" "));
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .spawn()
            .map_err(|source| ToolError::LaunchFailed {
                program: program.clone(),
                source,
            })?;

        let status = loop {
            if cancel_flag.load(Ordering::Relaxed) {
                warn!("cancellation requested; killing {program} (pid {})", child.id());
                kill_and_reap(&mut child, program);
                return Err(ToolError::Cancelled);
            }
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => std::thread::sleep(self.poll_interval),
                Err(source) => {
                    kill_and_reap(&mut child, program);
                    return Err(ToolError::Wait {
                        program: program.clone(),
                        source,
                    });
                }
            }
        };

        match exit_code(status) {
            0 => Ok(()),
            code => Err(ToolError::NonZeroExit(code)),
        }
    }
}
