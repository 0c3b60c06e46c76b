//! One watched test invocation.
//!
//! A [`TestInvocation`] spawns a simulator or device runner, scans its merged
//! output line by line for a completion marker and decides the verdict from
//! the marker line through a [`Criteria`] hook. A watchdog bounds the wait:
//! if no marker shows up in time the child is killed and the invocation
//! fails. The child is also killed once a verdict is reached, since boot
//! tests leave the simulator running after the marker.
//!
//! ```text
//! NotRun --spawn--> Running --marker, criteria ok--> Succeeded
//!                      |----marker, criteria ko----> Failed
//!                      |----eof without marker-----> Failed
//!                      '----watchdog elapsed-------> Failed (killed)
//! ```

use std::time::Duration;

use embci_core::Outcome;
use regex::Regex;
use tokio::process::Child;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{GateError, GateResult};
use crate::runner::{spawn_merged, CommandSpec};

/// Default watchdog window.
pub const DEFAULT_WATCHDOG: Duration = Duration::from_secs(600);

/// Lifecycle of a [`TestInvocation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationState {
    NotRun,
    Running,
    Succeeded,
    Failed,
}

/// Marker predicate plus success criterion on the marker line.
pub trait Criteria: Send + Sync {
    /// Whether `line` is the completion line.
    fn is_marker(&self, line: &str) -> bool;

    /// Verdict for the completion line.
    fn judge(&self, line: &str) -> bool;
}

/// Seeing the marker is success.
#[derive(Debug, Clone)]
pub struct MarkerCriteria {
    marker: String,
}

impl MarkerCriteria {
    pub fn new(marker: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
        }
    }
}

impl Criteria for MarkerCriteria {
    fn is_marker(&self, line: &str) -> bool {
        line.contains(&self.marker)
    }

    fn judge(&self, _line: &str) -> bool {
        true
    }
}

/// The marker line ends with a measurement that must stay under a bound.
#[derive(Debug, Clone)]
pub struct LatencyCriteria {
    marker: String,
    threshold: f64,
}

impl LatencyCriteria {
    pub fn new(marker: impl Into<String>, threshold: f64) -> Self {
        Self {
            marker: marker.into(),
            threshold,
        }
    }
}

/// Trailing decimal number of `line`, ignoring a unit suffix.
pub fn trailing_number(line: &str) -> Option<f64> {
    let trimmed = line.trim_end().trim_end_matches(|c: char| c.is_ascii_alphabetic());
    let trimmed = trimmed.trim_end();
    let start = trimmed
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_ascii_digit() || *c == '.')
        .last()
        .map(|(i, _)| i)?;
    trimmed[start..].parse().ok()
}

impl Criteria for LatencyCriteria {
    fn is_marker(&self, line: &str) -> bool {
        line.contains(&self.marker)
    }

    fn judge(&self, line: &str) -> bool {
        match trailing_number(line) {
            Some(v) => v <= self.threshold,
            None => {
                warn!(line, "latency line has no trailing number");
                false
            }
        }
    }
}

/// The marker line reports `pass: N` and `fail: M` counters.
#[derive(Debug, Clone)]
pub struct PassFailCriteria {
    marker: String,
    pass: Regex,
    fail: Regex,
}

impl PassFailCriteria {
    pub fn new(marker: impl Into<String>) -> GateResult<Self> {
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|e| GateError::Command {
                command: "regex".to_string(),
                output: e.to_string(),
            })
        };
        Ok(Self {
            marker: marker.into(),
            pass: compile(r"(?i)pass(?:ed)?\s*[:=]\s*(\d+)")?,
            fail: compile(r"(?i)fail(?:ed)?\s*[:=]\s*(\d+)")?,
        })
    }

    fn count(re: &Regex, line: &str) -> Option<u64> {
        re.captures(line)?.get(1)?.as_str().parse().ok()
    }
}

impl Criteria for PassFailCriteria {
    fn is_marker(&self, line: &str) -> bool {
        line.contains(&self.marker)
    }

    fn judge(&self, line: &str) -> bool {
        match (Self::count(&self.pass, line), Self::count(&self.fail, line)) {
            (Some(pass), Some(fail)) => fail == 0 && pass > 0,
            _ => false,
        }
    }
}

/// A single watched run of a test command.
pub struct TestInvocation {
    spec: CommandSpec,
    criteria: Box<dyn Criteria>,
    watchdog: Duration,
    state: InvocationState,
    pid: Option<u32>,
    marker_line: Option<String>,
}

impl TestInvocation {
    pub fn new(spec: CommandSpec, criteria: Box<dyn Criteria>, watchdog: Duration) -> Self {
        Self {
            spec,
            criteria,
            watchdog,
            state: InvocationState::NotRun,
            pid: None,
            marker_line: None,
        }
    }

    pub fn state(&self) -> InvocationState {
        self.state
    }

    /// Pid of the last spawned child.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// The line that carried the completion marker, if any.
    pub fn marker_line(&self) -> Option<&str> {
        self.marker_line.as_deref()
    }

    /// Make the invocation runnable again.
    pub fn reset_state(&mut self) {
        self.state = InvocationState::NotRun;
        self.pid = None;
        self.marker_line = None;
    }

    /// Spawn the command and wait for a verdict.
    ///
    /// Calling `run` again without [`reset_state`](Self::reset_state) does
    /// nothing and returns `Failure`.
    pub async fn run(&mut self) -> GateResult<Outcome> {
        if self.state != InvocationState::NotRun {
            warn!(command = %self.spec.display(), state = ?self.state, "invocation not reset");
            return Ok(Outcome::Failure);
        }

        let command = self.spec.display();
        let (mut child, mut rx) = match spawn_merged(&self.spec) {
            Ok(spawned) => spawned,
            Err(e) => {
                self.state = InvocationState::Failed;
                return Err(GateError::Command {
                    command,
                    output: e.to_string(),
                });
            }
        };
        self.state = InvocationState::Running;
        self.pid = child.id();
        info!(command = %command, pid = ?self.pid, watchdog_s = self.watchdog.as_secs(), "test running");

        let deadline = Instant::now() + self.watchdog;
        let verdict = loop {
            match tokio::time::timeout_at(deadline, rx.recv()).await {
                Ok(Some(line)) => {
                    println!("{}", line);
                    if self.criteria.is_marker(&line) {
                        let ok = self.criteria.judge(&line);
                        debug!(line = %line, ok, "completion marker");
                        self.marker_line = Some(line);
                        break ok;
                    }
                }
                Ok(None) => {
                    warn!(command = %command, "output ended without completion marker");
                    break false;
                }
                Err(_) => {
                    warn!(command = %command, "watchdog elapsed");
                    break false;
                }
            }
        };

        terminate(&mut child).await;
        self.state = if verdict {
            InvocationState::Succeeded
        } else {
            InvocationState::Failed
        };
        Ok(Outcome::from_success(verdict))
    }
}

/// Kill the child if still alive and reap it.
async fn terminate(child: &mut Child) {
    match child.try_wait() {
        Ok(Some(_)) => {}
        _ => {
            let _ = child.start_kill();
            let _ = child.wait().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> CommandSpec {
        CommandSpec::new("sh").arg("-c").arg(script)
    }

    #[test]
    fn test_trailing_number() {
        assert_eq!(trailing_number("max latency: 42"), Some(42.0));
        assert_eq!(trailing_number("avg latency 12.5us"), Some(12.5));
        assert_eq!(trailing_number("latency: n/a"), None);
    }

    #[test]
    fn test_latency_criteria() {
        let c = LatencyCriteria::new("max latency", 50.0);
        assert!(c.is_marker("max latency: 42"));
        assert!(c.judge("max latency: 42"));
        assert!(!c.judge("max latency: 51"));
        assert!(!c.judge("max latency: ??"));
    }

    #[test]
    fn test_pass_fail_criteria() {
        let c = PassFailCriteria::new("test summary").unwrap();
        assert!(c.judge("test summary pass: 12 fail: 0"));
        assert!(!c.judge("test summary pass: 12 fail: 1"));
        assert!(!c.judge("test summary pass: 0 fail: 0"));
        assert!(!c.judge("test summary"));
    }

    #[tokio::test]
    async fn test_marker_success() {
        let mut inv = TestInvocation::new(
            sh("echo booting; echo 'login: ready'; exec sleep 30"),
            Box::new(MarkerCriteria::new("login:")),
            Duration::from_secs(10),
        );
        assert_eq!(inv.state(), InvocationState::NotRun);
        assert_eq!(inv.run().await.unwrap(), Outcome::Success);
        assert_eq!(inv.state(), InvocationState::Succeeded);
        assert_eq!(inv.marker_line(), Some("login: ready"));
    }

    #[tokio::test]
    async fn test_eof_without_marker_fails() {
        let mut inv = TestInvocation::new(
            sh("echo nothing to see"),
            Box::new(MarkerCriteria::new("login:")),
            Duration::from_secs(10),
        );
        assert_eq!(inv.run().await.unwrap(), Outcome::Failure);
        assert_eq!(inv.state(), InvocationState::Failed);
    }

    #[tokio::test]
    async fn test_second_run_without_reset_is_failure() {
        let mut inv = TestInvocation::new(
            sh("echo 'done pass: 3 fail: 0'"),
            Box::new(PassFailCriteria::new("done").unwrap()),
            Duration::from_secs(10),
        );
        assert_eq!(inv.run().await.unwrap(), Outcome::Success);
        assert_eq!(inv.run().await.unwrap(), Outcome::Failure);
        assert_eq!(inv.state(), InvocationState::Succeeded);

        inv.reset_state();
        assert_eq!(inv.state(), InvocationState::NotRun);
        assert_eq!(inv.run().await.unwrap(), Outcome::Success);
    }

    #[tokio::test]
    async fn test_spawn_failure_marks_failed() {
        let mut inv = TestInvocation::new(
            CommandSpec::new("/nonexistent/qemu"),
            Box::new(MarkerCriteria::new("x")),
            Duration::from_secs(1),
        );
        assert!(inv.run().await.is_err());
        assert_eq!(inv.state(), InvocationState::Failed);
    }
}
