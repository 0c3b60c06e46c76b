//! Subprocess execution for external tools.
//!
//! The build tool, linters and doc generators are opaque children. Their
//! stdout and stderr share one pipe, so the lines we read keep the order the
//! child wrote them in, and in streaming mode they are forwarded to our
//! stdout so the job console shows them verbatim.
//! Success is decided per call site by a [`MarkerPolicy`].

use std::collections::VecDeque;
use std::io;
use std::os::fd::OwnedFd;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use embci_core::Outcome;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::net::unix::pipe;
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::{GateError, GateResult};

/// Lines kept from a streamed run.
const STREAM_TAIL_LINES: usize = 200;

/// Failure marker bitbake prints when a task fails.
pub const BITBAKE_FAILURE_MARKER: &str = "returning a non-zero exit code.";

/// Success marker of the UniProton build script.
pub const UNIPROTON_SUCCESS_MARKER: &str = "all lib succeed! ####################";

/// A command line to run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub envs: Vec<(String, String)>,
    pub timeout: Option<Duration>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.envs.push((key.to_string(), value.to_string()));
        self
    }

    pub fn timeout(mut self, limit: Duration) -> Self {
        self.timeout = Some(limit);
        self
    }

    /// `program arg1 arg2 ...` for logs and error messages.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub(crate) fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        if let Some(dir) = &self.cwd {
            cmd.current_dir(dir);
        }
        for (k, v) in &self.envs {
            cmd.env(k, v);
        }
        cmd
    }
}

/// What a finished child left behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutput {
    pub command: String,
    /// `None` when killed by a signal
    pub exit_code: Option<i32>,
    /// Last line the child wrote, on either stream
    pub last_line: String,
    /// Full output when captured, the last lines when streamed
    pub output: String,
    /// Whether the watched marker appeared on any line
    pub marker_seen: bool,
    pub duration_ms: u64,
}

impl RunOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// How a call site turns a finished child into an [`Outcome`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkerPolicy {
    /// Exit code 0 means success.
    ExitCodeOnly,
    /// Failure iff the last line contains the marker; exit code ignored.
    FailureMarkerInLastLine(String),
    /// Success iff the last line contains the marker; exit code ignored.
    SuccessMarkerInLastLine(String),
    /// Success iff exit code 0 and the marker appeared on no line.
    FailureMarkerOrNonZeroExit(String),
}

impl MarkerPolicy {
    pub fn bitbake_last_line() -> Self {
        MarkerPolicy::FailureMarkerInLastLine(BITBAKE_FAILURE_MARKER.to_string())
    }

    pub fn bitbake_strict() -> Self {
        MarkerPolicy::FailureMarkerOrNonZeroExit(BITBAKE_FAILURE_MARKER.to_string())
    }

    fn watched(&self) -> Option<&str> {
        match self {
            MarkerPolicy::ExitCodeOnly => None,
            MarkerPolicy::FailureMarkerInLastLine(m)
            | MarkerPolicy::SuccessMarkerInLastLine(m)
            | MarkerPolicy::FailureMarkerOrNonZeroExit(m) => Some(m.as_str()),
        }
    }

    pub fn judge(&self, out: &RunOutput) -> Outcome {
        let ok = match self {
            MarkerPolicy::ExitCodeOnly => out.success(),
            MarkerPolicy::FailureMarkerInLastLine(m) => !out.last_line.contains(m.as_str()),
            MarkerPolicy::SuccessMarkerInLastLine(m) => out.last_line.contains(m.as_str()),
            MarkerPolicy::FailureMarkerOrNonZeroExit(_) => out.success() && !out.marker_seen,
        };
        Outcome::from_success(ok)
    }
}

/// Runs external tools.
pub struct SubprocessRunner;

impl SubprocessRunner {
    /// Run, forwarding every line to stdout.
    pub async fn stream(spec: &CommandSpec) -> GateResult<RunOutput> {
        Self::execute(spec, true, None).await
    }

    /// Run quietly, keeping the full combined output.
    pub async fn capture(spec: &CommandSpec) -> GateResult<RunOutput> {
        Self::execute(spec, false, None).await
    }

    /// Run and fail unless the exit code is 0. The output is echoed.
    pub async fn checked(spec: &CommandSpec) -> GateResult<RunOutput> {
        let out = Self::execute(spec, true, None).await?;
        if !out.success() {
            return Err(GateError::Command {
                command: out.command,
                output: format!("exit code {:?}: {}", out.exit_code, out.last_line),
            });
        }
        Ok(out)
    }

    /// Stream the child and judge it with `policy`.
    pub async fn judged(spec: &CommandSpec, policy: &MarkerPolicy) -> GateResult<(RunOutput, Outcome)> {
        let out = Self::execute(spec, true, policy.watched()).await?;
        let outcome = policy.judge(&out);
        debug!(command = %out.command, exit = ?out.exit_code, %outcome, "judged");
        Ok((out, outcome))
    }

    async fn execute(spec: &CommandSpec, echo: bool, watch: Option<&str>) -> GateResult<RunOutput> {
        let start = Instant::now();
        let command = spec.display();
        debug!(command = %command, cwd = ?spec.cwd, "spawning");

        let (mut child, mut rx) = spawn_merged(spec).map_err(|e| GateError::Command {
            command: command.clone(),
            output: e.to_string(),
        })?;

        let collect = async {
            let mut last_line = String::new();
            let mut kept: VecDeque<String> = VecDeque::new();
            let mut marker_seen = false;
            while let Some(line) = rx.recv().await {
                if echo {
                    println!("{}", line);
                }
                if let Some(m) = watch {
                    marker_seen |= line.contains(m);
                }
                kept.push_back(line.clone());
                if echo && kept.len() > STREAM_TAIL_LINES {
                    kept.pop_front();
                }
                last_line = line;
            }
            let status = child.wait().await?;
            Ok::<_, std::io::Error>((status, last_line, kept, marker_seen))
        };

        let collected = match spec.timeout {
            Some(limit) => {
                let res = tokio::time::timeout(limit, collect).await;
                match res {
                    Ok(r) => r?,
                    Err(_) => {
                        warn!(command = %command, "timed out, killing");
                        let _ = child.start_kill();
                        let _ = child.wait().await;
                        return Err(GateError::Command {
                            command,
                            output: format!("timed out after {}s", limit.as_secs()),
                        });
                    }
                }
            }
            None => collect.await?,
        };
        let (status, last_line, kept, marker_seen) = collected;

        let output = kept.into_iter().collect::<Vec<_>>().join("\n");
        Ok(RunOutput {
            command,
            exit_code: status.code(),
            last_line,
            output,
            marker_seen,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }
}

/// Spawn `spec` with stdout and stderr on one pipe and pump its lines into
/// the returned channel, which closes at EOF.
pub(crate) fn spawn_merged(spec: &CommandSpec) -> io::Result<(Child, mpsc::UnboundedReceiver<String>)> {
    let (reader, writer) = io::pipe()?;
    let mut cmd = spec.to_command();
    cmd.stdin(Stdio::null())
        .stdout(writer.try_clone()?)
        .stderr(writer)
        .kill_on_drop(true);
    let spawned = cmd.spawn();
    // The command owns our copies of the write end; EOF needs them closed.
    drop(cmd);
    let child = spawned?;

    let output = pipe::Receiver::from_owned_fd(OwnedFd::from(reader))?;
    let (tx, rx) = mpsc::unbounded_channel();
    spawn_line_pump(output, tx);
    Ok((child, rx))
}

/// Forward lines of `reader` into `tx` until EOF. Invalid UTF-8 is replaced.
fn spawn_line_pump<R>(reader: R, tx: mpsc::UnboundedSender<String>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf)
                        .trim_end_matches(|c| c == '\n' || c == '\r')
                        .to_string();
                    if tx.send(line).is_err() {
                        break;
                    }
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> CommandSpec {
        CommandSpec::new("sh").arg("-c").arg(script)
    }

    fn output(last_line: &str, exit_code: i32, marker_seen: bool) -> RunOutput {
        RunOutput {
            command: "x".to_string(),
            exit_code: Some(exit_code),
            last_line: last_line.to_string(),
            output: String::new(),
            marker_seen,
            duration_ms: 0,
        }
    }

    #[test]
    fn test_display() {
        let spec = CommandSpec::new("oebuild").args(["bitbake", "openeuler-image"]);
        assert_eq!(spec.display(), "oebuild bitbake openeuler-image");
    }

    #[test]
    fn test_policies() {
        let failed_line = "ERROR: Task do_compile returning a non-zero exit code.";
        assert_eq!(
            MarkerPolicy::bitbake_last_line().judge(&output(failed_line, 0, true)),
            Outcome::Failure
        );
        assert_eq!(
            MarkerPolicy::bitbake_last_line().judge(&output("done", 1, false)),
            Outcome::Success,
            "last-line policy ignores exit code"
        );
        assert_eq!(
            MarkerPolicy::SuccessMarkerInLastLine(UNIPROTON_SUCCESS_MARKER.to_string())
                .judge(&output("#### all lib succeed! ####################", 1, true)),
            Outcome::Success
        );
        assert_eq!(
            MarkerPolicy::bitbake_strict().judge(&output("done", 0, true)),
            Outcome::Failure
        );
        assert_eq!(
            MarkerPolicy::bitbake_strict().judge(&output("done", 2, false)),
            Outcome::Failure
        );
        assert_eq!(
            MarkerPolicy::ExitCodeOnly.judge(&output(failed_line, 0, true)),
            Outcome::Success
        );
    }

    #[tokio::test]
    async fn test_capture_merges_streams() {
        let out = SubprocessRunner::capture(&sh("echo out; echo err 1>&2; exit 3"))
            .await
            .unwrap();
        assert_eq!(out.exit_code, Some(3));
        assert!(out.output.contains("out"));
        assert!(out.output.contains("err"));
    }

    #[tokio::test]
    async fn test_zero_exit_with_marker_is_failure() {
        let spec = sh("echo building; echo 'ERROR: Task returning a non-zero exit code.'; exit 0");
        let (out, outcome) = SubprocessRunner::judged(&spec, &MarkerPolicy::bitbake_last_line())
            .await
            .unwrap();
        assert!(out.success());
        assert!(out.marker_seen);
        assert_eq!(outcome, Outcome::Failure);
    }

    #[tokio::test]
    async fn test_last_line_follows_write_order() {
        let spec = sh("echo 'NOTE: x' >&2; echo 'ERROR: Task do_compile returning a non-zero exit code.'; exit 0");
        for _ in 0..50 {
            let (out, outcome) = SubprocessRunner::judged(&spec, &MarkerPolicy::bitbake_last_line())
                .await
                .unwrap();
            assert!(out.last_line.contains(BITBAKE_FAILURE_MARKER));
            assert_eq!(outcome, Outcome::Failure);
        }

        let spec = sh("echo 'ERROR: returning a non-zero exit code.'; echo 'NOTE: summary' >&2");
        for _ in 0..50 {
            let (out, outcome) = SubprocessRunner::judged(&spec, &MarkerPolicy::bitbake_last_line())
                .await
                .unwrap();
            assert_eq!(out.last_line, "NOTE: summary");
            assert_eq!(outcome, Outcome::Success);
        }
    }

    #[tokio::test]
    async fn test_checked_rejects_non_zero() {
        let err = SubprocessRunner::checked(&sh("exit 1")).await.unwrap_err();
        assert!(matches!(err, GateError::Command { .. }));
    }

    #[tokio::test]
    async fn test_missing_program_is_error() {
        let err = SubprocessRunner::capture(&CommandSpec::new("/nonexistent/tool"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("/nonexistent/tool"));
    }

    #[tokio::test]
    async fn test_timeout_kills_child() {
        let spec = CommandSpec::new("sleep")
            .arg("30")
            .timeout(Duration::from_millis(200));
        let start = Instant::now();
        let err = SubprocessRunner::capture(&spec).await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
        assert!(start.elapsed() < Duration::from_secs(10));
    }
}
