//! Command Runner: spawns one external process and reports how it ended.
//!
//! [`run`] never fails. Launch failures, non-zero exits, timeouts and
//! cancellation all come back as an [`ExecutionResult`] whose [`ExecOutcome`]
//! names what happened, with both output streams captured up to that point.

use crate::model::{ExecOutcome, ExecutionResult, OutputLine, OutputStream};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[cfg(unix)]
use nix::sys::signal::{killpg, Signal};
#[cfg(unix)]
use nix::unistd::Pid;

/// How long to wait for output still buffered in pipes after the process is gone.
const OUTPUT_GRACE: Duration = Duration::from_secs(2);
/// How long to wait for a killed process to be reaped.
const REAP_GRACE: Duration = Duration::from_secs(5);

/// A program invocation. Arguments are passed as argv, never through a shell.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    /// Command-line text placed after `args` without any quoting. Only Windows
    /// passes it through untouched; other hosts see it as one more argument.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verbatim: Option<String>,
}

impl CommandSpec {
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    /// Program given as a filesystem path, e.g. a discovered toolchain.
    #[must_use]
    pub fn from_path(program: &Path) -> Self {
        Self::new(program.to_string_lossy())
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    #[must_use]
    pub fn arg_path(self, arg: &Path) -> Self {
        self.arg(arg.to_string_lossy())
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    #[must_use]
    pub fn envs(mut self, vars: &BTreeMap<String, String>) -> Self {
        self.env
            .extend(vars.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    #[must_use]
    pub fn verbatim(mut self, tail: impl Into<String>) -> Self {
        self.verbatim = Some(tail.into());
        self
    }

    fn to_std_command(&self) -> std::process::Command {
        let mut command = std::process::Command::new(&self.program);
        command.args(&self.args);
        if let Some(tail) = &self.verbatim {
            push_verbatim(&mut command, tail);
        }
        if let Some(dir) = &self.cwd {
            command.current_dir(dir);
        }
        command.envs(&self.env);
        command
    }

    fn to_command(&self) -> Command {
        Command::from(self.to_std_command())
    }
}

#[cfg(windows)]
fn push_verbatim(command: &mut std::process::Command, tail: &str) {
    use std::os::windows::process::CommandExt;
    command.raw_arg(tail);
}

#[cfg(not(windows))]
fn push_verbatim(command: &mut std::process::Command, tail: &str) {
    command.arg(tail);
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " \"{arg}\"")?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        if let Some(tail) = &self.verbatim {
            write!(f, " {tail}")?;
        }
        Ok(())
    }
}

/// Per-call execution controls.
#[derive(Clone, Debug, Default)]
pub struct ExecOptions {
    /// Terminate the process tree once this elapses.
    pub timeout: Option<Duration>,
    /// Terminate the process tree when this is cancelled.
    pub cancel: Option<CancellationToken>,
    /// Receives each output line while the process runs.
    pub sink: Option<UnboundedSender<OutputLine>>,
}

impl ExecOptions {
    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_cancel(mut self, cancel: Option<CancellationToken>) -> Self {
        self.cancel = cancel;
        self
    }

    #[must_use]
    pub fn with_sink(mut self, sink: UnboundedSender<OutputLine>) -> Self {
        self.sink = Some(sink);
        self
    }
}

enum Stop {
    Exited(ExitStatus),
    WaitFailed(String),
    TimedOut,
    Cancelled,
}

/// Run `spec` to completion, timeout or cancellation.
pub async fn run(spec: &CommandSpec, options: &ExecOptions) -> ExecutionResult {
    let deadline = options.timeout.map(|timeout| Instant::now() + timeout);

    let mut command = spec.to_command();
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    // Own process group so the whole tree can be signalled at once.
    #[cfg(unix)]
    command.process_group(0);

    tracing::debug!(command = %spec, cwd = ?spec.cwd, "spawning process");
    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(err) => return launch_error(spec, &err),
    };
    let pid = child.id();

    let mut stdout_task = spawn_reader(child.stdout.take(), OutputStream::Stdout, options);
    let mut stderr_task = spawn_reader(child.stderr.take(), OutputStream::Stderr, options);

    let mut stop = tokio::select! {
        status = child.wait() => match status {
            Ok(status) => Stop::Exited(status),
            Err(err) => Stop::WaitFailed(err.to_string()),
        },
        () = until(deadline) => Stop::TimedOut,
        () = cancelled(options.cancel.as_ref()) => Stop::Cancelled,
    };

    // Descendants may still hold the pipes open; they share the deadline.
    // Each reader's output is kept as soon as it resolves so a finished
    // handle is never polled again.
    let mut stdout_text: Option<String> = None;
    let mut stderr_text: Option<String> = None;
    if let Stop::Exited(status) = stop {
        stop = loop {
            if stdout_text.is_some() && stderr_text.is_some() {
                break Stop::Exited(status);
            }
            tokio::select! {
                out = &mut stdout_task, if stdout_text.is_none() => {
                    stdout_text = Some(reader_output(out));
                }
                err = &mut stderr_task, if stderr_text.is_none() => {
                    stderr_text = Some(reader_output(err));
                }
                () = until(deadline) => break Stop::TimedOut,
                () = cancelled(options.cancel.as_ref()) => break Stop::Cancelled,
            }
        };
    }

    if matches!(stop, Stop::TimedOut | Stop::Cancelled) {
        terminate_tree(pid, &mut child).await;
    }

    let stdout = match stdout_text {
        Some(text) => text,
        None => drain(stdout_task).await,
    };
    let mut stderr = match stderr_text {
        Some(text) => text,
        None => drain(stderr_task).await,
    };

    let outcome = match stop {
        Stop::Exited(status) if status.success() => ExecOutcome::Ok,
        Stop::Exited(status) => {
            let exit_code = status.code();
            match exit_code {
                Some(code) => annotate(&mut stderr, &format!("Process exited with non-zero code: {code}")),
                None => annotate(&mut stderr, "Process was terminated by a signal"),
            }
            ExecOutcome::Failed { exit_code }
        }
        Stop::WaitFailed(cause) => {
            annotate(&mut stderr, &format!("Failed to wait for process: {cause}"));
            ExecOutcome::Failed { exit_code: None }
        }
        Stop::TimedOut => {
            let timeout_ms = options
                .timeout
                .map_or(0, |t| u64::try_from(t.as_millis()).unwrap_or(u64::MAX));
            annotate(
                &mut stderr,
                &format!("Process timed out after {timeout_ms} ms and was terminated"),
            );
            ExecOutcome::TimedOut { timeout_ms }
        }
        Stop::Cancelled => {
            annotate(&mut stderr, "Process was cancelled");
            ExecOutcome::Cancelled
        }
    };
    tracing::debug!(command = %spec, ?outcome, "process finished");
    ExecutionResult::new(stdout, stderr, outcome)
}

/// Start `spec` without waiting for it or capturing its output.
///
/// Used for console windows the user interacts with directly; the result only
/// says whether the launch itself worked.
pub fn launch_detached(spec: &CommandSpec) -> ExecutionResult {
    let mut command = spec.to_std_command();
    command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    match command.spawn() {
        Ok(child) => {
            tracing::info!(command = %spec, pid = child.id(), "launched detached process");
            ExecutionResult::started(format!(
                "Started in an external terminal: {spec}\nOutput appears in that window."
            ))
        }
        Err(err) => launch_error(spec, &err),
    }
}

fn launch_error(spec: &CommandSpec, err: &std::io::Error) -> ExecutionResult {
    tracing::debug!(command = %spec, error = %err, "process failed to start");
    let cause = err.to_string();
    ExecutionResult::new(
        String::new(),
        format!("Failed to start process '{}': {cause}", spec.program),
        ExecOutcome::LaunchError { cause },
    )
}

fn annotate(stderr: &mut String, line: &str) {
    if !stderr.is_empty() && !stderr.ends_with('\n') {
        stderr.push('\n');
    }
    stderr.push_str(line);
}

async fn until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending::<()>().await,
    }
}

async fn cancelled(token: Option<&CancellationToken>) {
    match token {
        Some(token) => token.cancelled().await,
        None => std::future::pending::<()>().await,
    }
}

fn spawn_reader<R>(
    pipe: Option<R>,
    stream: OutputStream,
    options: &ExecOptions,
) -> JoinHandle<String>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let sink = options.sink.clone();
    tokio::spawn(async move {
        match pipe {
            Some(pipe) => read_lines(pipe, stream, sink).await,
            None => String::new(),
        }
    })
}

async fn read_lines<R>(pipe: R, stream: OutputStream, sink: Option<UnboundedSender<OutputLine>>) -> String
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(pipe);
    let mut collected = String::new();
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let text = String::from_utf8_lossy(&buf);
                collected.push_str(&text);
                if let Some(sink) = &sink {
                    let line = text.trim_end_matches(['\r', '\n']).to_string();
                    let _ = sink.send(OutputLine { stream, line });
                }
            }
            Err(err) => {
                tracing::debug!(?stream, error = %err, "output pipe read failed");
                break;
            }
        }
    }
    collected
}

fn reader_output(joined: Result<String, JoinError>) -> String {
    joined.unwrap_or_else(|err| {
        tracing::warn!(error = %err, "output reader task failed");
        String::new()
    })
}

async fn drain(mut task: JoinHandle<String>) -> String {
    match tokio::time::timeout(OUTPUT_GRACE, &mut task).await {
        Ok(joined) => reader_output(joined),
        Err(_) => {
            task.abort();
            String::new()
        }
    }
}

async fn terminate_tree(pid: Option<u32>, child: &mut Child) {
    if let Some(pid) = pid {
        kill_process_tree(pid).await;
    }
    if let Err(err) = child.start_kill() {
        tracing::debug!(error = %err, "direct kill failed; process likely already gone");
    }
    if tokio::time::timeout(REAP_GRACE, child.wait()).await.is_err() {
        tracing::warn!(?pid, "terminated process was not reaped in time");
    }
}

#[cfg(unix)]
async fn kill_process_tree(pid: u32) {
    let Ok(raw) = i32::try_from(pid) else {
        return;
    };
    if let Err(err) = signal_process_group(Pid::from_raw(raw), Signal::SIGKILL) {
        tracing::warn!(pid, error = %err, "failed to kill process group");
    }
}

#[cfg(unix)]
fn signal_process_group(pgid: Pid, signal: Signal) -> Result<(), nix::errno::Errno> {
    match killpg(pgid, signal) {
        // ESRCH means the group is already gone.
        Ok(()) | Err(nix::errno::Errno::ESRCH) => Ok(()),
        Err(err) => Err(err),
    }
}

#[cfg(windows)]
async fn kill_process_tree(pid: u32) {
    let status = Command::new("taskkill")
        .args(["/T", "/F", "/PID", &pid.to_string()])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;
    if let Err(err) = status {
        tracing::warn!(pid, error = %err, "taskkill failed");
    }
}

#[cfg(not(any(unix, windows)))]
async fn kill_process_tree(_pid: u32) {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_quotes_arguments_with_spaces() {
        let spec = CommandSpec::new("python").args(["-c", "print('a b')"]);
        assert_eq!(spec.to_string(), "python -c \"print('a b')\"");
    }

    #[test]
    fn display_appends_verbatim_tail_unquoted() {
        let spec = CommandSpec::new("cmd")
            .args(["/C", "start"])
            .verbatim("\"demo\" cmd /K \"x && y\"");
        assert_eq!(spec.to_string(), "cmd /C start \"demo\" cmd /K \"x && y\"");
    }

    #[test]
    fn annotation_starts_on_its_own_line() {
        let mut stderr = String::from("boom");
        annotate(&mut stderr, "Process exited with non-zero code: 3");
        assert_eq!(stderr, "boom\nProcess exited with non-zero code: 3");

        let mut empty = String::new();
        annotate(&mut empty, "x");
        assert_eq!(empty, "x");
    }
}
