//! Time-bounded execution of build and run steps
//!
//! Every step runs directly from its argument vector in a fresh process
//! group. A single deadline covers the whole sequence; when it passes, the
//! running step's process group is killed.

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, instrument};

pub use crate::executor::command::StepCommand;
use crate::config::{Config, MAX_SECONDS};
use crate::executor::process::{StepResult, run_until};

mod command;
mod process;

/// Errors that occur while executing steps
///
/// These are failures of the executor itself. A program that fails to
/// compile or exits non-zero is an [`ExecutionOutcome`], not an error.
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("empty command")]
    EmptyCommand,

    #[error("no run step to execute")]
    NoRunStep,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Role of a step in the sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    /// A failure ends the sequence with [`ExecutionOutcome::BuildFailed`]
    Build,
    /// Produces the final outcome
    Run,
}

/// A command and its role
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub kind: StepKind,
    pub command: StepCommand,
}

impl Step {
    pub fn build(command: StepCommand) -> Self {
        Self {
            kind: StepKind::Build,
            command,
        }
    }

    pub fn run(command: StepCommand) -> Self {
        Self {
            kind: StepKind::Run,
            command,
        }
    }
}

/// Classified result of one execution request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    /// The run step exited with code 0 before the deadline
    Success {
        stdout: String,
        stderr: String,
        exit_code: i32,
    },

    /// A build step failed; later steps were not run
    BuildFailed {
        stdout: String,
        stderr: String,
        exit_code: Option<i32>,
    },

    /// The run step exited non-zero or was killed by a signal
    RuntimeFailed {
        stdout: String,
        stderr: String,
        exit_code: Option<i32>,
        signal: Option<i32>,
    },

    /// The deadline passed; partial output is discarded
    TimedOut,

    /// The toolchain is not available
    PreflightFailed { reason: String, remediation: String },
}

impl ExecutionOutcome {
    /// Check if the program ran to completion with exit code 0
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionOutcome::Success { .. })
    }

    /// Short name of the variant, for logs
    pub fn kind(&self) -> &'static str {
        match self {
            ExecutionOutcome::Success { .. } => "success",
            ExecutionOutcome::BuildFailed { .. } => "build_failed",
            ExecutionOutcome::RuntimeFailed { .. } => "runtime_failed",
            ExecutionOutcome::TimedOut => "timed_out",
            ExecutionOutcome::PreflightFailed { .. } => "preflight_failed",
        }
    }
}

/// Result of a preflight check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Preflight {
    Passed,
    /// The check could not be spawned, exited non-zero or timed out
    Failed(String),
}

/// Runs step sequences under a deadline
#[derive(Debug, Clone)]
pub struct ProcessExecutor {
    /// Bytes kept per output stream
    max_output: usize,
    /// Time allowed for a killed process to be reaped
    kill_grace: Duration,
}

impl ProcessExecutor {
    /// Create a new executor
    pub fn new(max_output: usize, kill_grace: Duration) -> Self {
        Self {
            max_output,
            kill_grace,
        }
    }

    /// Create an executor with the limits from the configuration
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.max_output, config.kill_grace())
    }

    /// Run the steps in order under one deadline
    ///
    /// The deadline starts now and bounds every remaining step. The first
    /// failing build step ends the sequence. The first run step decides the
    /// outcome.
    #[instrument(skip(self, steps), fields(steps = steps.len()))]
    pub async fn run(
        &self,
        steps: &[Step],
        deadline: Duration,
    ) -> Result<ExecutionOutcome, ExecutorError> {
        let deadline = deadline_after(deadline);

        for step in steps {
            debug!(kind = ?step.kind, command = %step.command, "running step");

            let exited =
                match run_until(&step.command, deadline, self.kill_grace, self.max_output).await? {
                    StepResult::Exited(exited) => exited,
                    StepResult::TimedOut => return Ok(ExecutionOutcome::TimedOut),
                };

            let stdout = String::from_utf8_lossy(&exited.stdout).into_owned();
            let stderr = String::from_utf8_lossy(&exited.stderr).into_owned();

            match step.kind {
                StepKind::Build if exited.success() => continue,
                StepKind::Build => {
                    return Ok(ExecutionOutcome::BuildFailed {
                        stdout,
                        stderr,
                        exit_code: exited.exit_code(),
                    });
                }
                StepKind::Run if exited.success() => {
                    return Ok(ExecutionOutcome::Success {
                        stdout,
                        stderr,
                        exit_code: 0,
                    });
                }
                StepKind::Run => {
                    return Ok(ExecutionOutcome::RuntimeFailed {
                        stdout,
                        stderr,
                        exit_code: exited.exit_code(),
                        signal: exited.signal(),
                    });
                }
            }
        }

        Err(ExecutorError::NoRunStep)
    }

    /// Check that a toolchain command runs and exits successfully
    #[instrument(skip(self))]
    pub async fn preflight(&self, command: &StepCommand, timeout: Duration) -> Preflight {
        let deadline = deadline_after(timeout);
        match run_until(command, deadline, self.kill_grace, self.max_output).await {
            Ok(StepResult::Exited(exited)) if exited.success() => Preflight::Passed,
            Ok(StepResult::Exited(exited)) => Preflight::Failed(format!(
                "'{}' exited with {}",
                command.program().unwrap_or_default(),
                exited.status
            )),
            Ok(StepResult::TimedOut) => Preflight::Failed(format!(
                "'{}' did not finish within {:?}",
                command.program().unwrap_or_default(),
                timeout
            )),
            Err(e) => Preflight::Failed(e.to_string()),
        }
    }
}

/// Deadline `duration` from now, clamped to [`MAX_SECONDS`]
fn deadline_after(duration: Duration) -> Instant {
    let now = Instant::now();
    let duration = duration.min(Duration::from_secs_f64(MAX_SECONDS));
    now.checked_add(duration).unwrap_or(now)
}
