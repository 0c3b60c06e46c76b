//! embci-gate: pull-request gate and build/check/test tasks
//!
//! - [`pipeline`]: the gate state machine, from preempting an earlier run
//!   to labelling the PR.
//! - [`preempt`]: `flock`-guarded run record that keeps one current run per PR.
//! - [`runner`] and [`test_run`]: subprocess execution with marker policies,
//!   and the watchdog-bounded test invocation.
//! - [`tasks`] and [`registry`]: built-in tasks and their task paths.
//! - [`cron`]: scheduled sstate cache pre-warm.
//! - [`daily`]: daily build of a branch from a fresh workspace.

pub mod cron;
pub mod daily;
pub mod error;
pub mod fetch;
pub mod pipeline;
pub mod preempt;
pub mod registry;
pub mod runner;
pub mod tasks;
pub mod test_run;

pub use cron::{BuildFailure, CronRequest, CronRunner};
pub use daily::{DailyBuild, DailyRequest};
pub use error::{GateError, GateResult};
pub use fetch::{GitFetcher, SourceFetcher};
pub use pipeline::{GatePipeline, GateRequest, GateStage, GateSummary};
pub use preempt::{preempt, PreemptOutcome, RunLockKey, RunRecord};
pub use registry::builtin_extensions;
pub use runner::{CommandSpec, MarkerPolicy, RunOutput, SubprocessRunner};
pub use test_run::{Criteria, InvocationState, TestInvocation};
