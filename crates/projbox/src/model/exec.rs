use serde::{Deserialize, Serialize};

/// How a process-backed operation ended.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExecOutcome {
    /// Exited with status zero, or a non-process action (browser, detached
    /// terminal) was started.
    Ok,
    /// Exited unsuccessfully. `exit_code` is `None` when killed by a signal.
    Failed { exit_code: Option<i32> },
    /// The program could not be started at all.
    LaunchError { cause: String },
    /// The deadline elapsed and the process tree was terminated.
    TimedOut { timeout_ms: u64 },
    /// A cancellation request terminated the process tree.
    Cancelled,
    /// A required toolchain, compiler or entry file is missing.
    Unavailable { reason: String },
    /// The operation has no meaning for this project type.
    NotApplicable { reason: String },
}

/// Captured output of a process-backed operation.
///
/// Both streams are always present (empty rather than absent). Failure kinds
/// also append a human-readable annotation line to `stderr`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub stdout: String,
    pub stderr: String,
    pub outcome: ExecOutcome,
}

impl ExecutionResult {
    #[must_use]
    pub fn new(stdout: String, stderr: String, outcome: ExecOutcome) -> Self {
        Self {
            stdout,
            stderr,
            outcome,
        }
    }

    /// Successful action that produced only a status message.
    #[must_use]
    pub fn started(message: impl Into<String>) -> Self {
        Self::new(message.into(), String::new(), ExecOutcome::Ok)
    }

    #[must_use]
    pub fn unavailable(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self::new(
            String::new(),
            reason.clone(),
            ExecOutcome::Unavailable { reason },
        )
    }

    #[must_use]
    pub fn not_applicable(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self::new(
            reason.clone(),
            String::new(),
            ExecOutcome::NotApplicable { reason },
        )
    }

    #[must_use]
    pub fn success(&self) -> bool {
        matches!(self.outcome, ExecOutcome::Ok)
    }

    /// Exit code the CLI should mirror for this result.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match &self.outcome {
            ExecOutcome::Ok | ExecOutcome::NotApplicable { .. } => 0,
            ExecOutcome::Failed { exit_code } => exit_code.unwrap_or(1),
            ExecOutcome::TimedOut { .. } => 124,
            ExecOutcome::Cancelled => 130,
            ExecOutcome::LaunchError { .. } => 127,
            ExecOutcome::Unavailable { .. } => 1,
        }
    }
}

/// Which stream an [`OutputLine`] came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// A line forwarded while a process is still running.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputLine {
    pub stream: OutputStream,
    pub line: String,
}
