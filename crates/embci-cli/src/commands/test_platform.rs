//! `testPlatform`: run one test task against a build output.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use clap::{ArgMatches, Args};
use embci_core::capability::{self, TestParameter};
use embci_core::{AppContext, CiCommand};
use embci_gate::registry::{test_task_path, RUN_SYMBOL};
use tracing::info;

use super::parse_args;

#[derive(Debug, Clone, Args)]
pub struct TestPlatformArgs {
    #[arg(short = 'a', long = "arch")]
    pub arch: String,

    /// Test task: qemu_boot or board_suite
    #[arg(long = "target")]
    pub target: String,

    /// Build output root (contains `output/`)
    #[arg(long = "target_directory")]
    pub target_directory: PathBuf,

    /// Completion marker the output must contain
    #[arg(long = "marker")]
    pub marker: Option<String>,

    /// Latency upper bound; switches to latency judging
    #[arg(long = "threshold")]
    pub threshold: Option<f64>,

    /// Seconds without completion before the child is killed
    #[arg(long = "watchdog")]
    pub watchdog: Option<u64>,

    /// Suite command, after `--`
    #[arg(last = true)]
    pub command: Vec<String>,
}

impl TestPlatformArgs {
    pub fn parameter(&self, ctx: &AppContext) -> TestParameter {
        TestParameter {
            arch: self.arch.clone(),
            target_dir: self.target_directory.clone(),
            conf_dir: ctx.paths.conf_dir.clone(),
            command: self.command.clone(),
            marker: self.marker.clone(),
            threshold: self.threshold,
            watchdog: self.watchdog.map(Duration::from_secs),
        }
    }
}

pub struct TestPlatform;

#[async_trait]
impl CiCommand for TestPlatform {
    fn name(&self) -> &'static str {
        "testPlatform"
    }

    fn help(&self) -> &'static str {
        "Test Platform"
    }

    fn description(&self) -> &'static str {
        "Test Platform is used to test images"
    }

    fn declare_flags(&self, parser: clap::Command) -> clap::Command {
        TestPlatformArgs::augment_args(parser)
    }

    async fn execute(&self, ctx: &AppContext, matches: &ArgMatches) -> Result<()> {
        let args: TestPlatformArgs = parse_args(matches)?;
        anyhow::ensure!(
            args.target_directory.is_dir(),
            "Target directory {} does not exist",
            args.target_directory.display()
        );
        let task = ctx
            .extensions
            .load_test(&test_task_path(&args.target), RUN_SYMBOL)?;
        let outcome = capability::test(task.as_ref(), &args.parameter(ctx)).await?;
        info!(task = %args.target, arch = %args.arch, %outcome, "test finished");
        anyhow::ensure!(outcome.is_success(), "test {} failed", args.target);
        Ok(())
    }
}
