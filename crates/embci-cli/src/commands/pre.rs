//! `pre`: take over a pull request before a pipeline-driven gate run.
//!
//! Stops the previous run when it is still building, records this run as
//! the owner and marks the PR as being processed. The record is the one
//! `gate` uses, so the two commands supersede each other.

use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{ArgMatches, Args};
use embci_core::config::RunContext;
use embci_core::report;
use embci_core::{AppContext, CiCommand};
use embci_forge::{ForgeClient, JobRunner};
use embci_gate::{preempt, PreemptOutcome, RunLockKey};
use tracing::info;

use super::{common_config, parse_args, ForgeArgs, JobRunnerArgs};

#[derive(Debug, Clone, Args)]
pub struct PreArgs {
    /// Shared directory holding the run records
    #[arg(short = 's', long = "share_dir")]
    pub share_dir: PathBuf,

    #[command(flatten)]
    pub forge: ForgeArgs,

    #[command(flatten)]
    pub jobs: JobRunnerArgs,

    #[arg(long = "pr_num")]
    pub pr_num: u64,
}

impl PreArgs {
    pub fn lock_key(&self) -> RunLockKey {
        RunLockKey::new(&self.share_dir, &self.forge.repo, &self.forge.owner, self.pr_num)
    }
}

/// Preempt the earlier run of `key` and set the processing label.
pub async fn prepare_pr(
    key: &RunLockKey,
    run: &RunContext,
    forge: &dyn ForgeClient,
    jobs: &dyn JobRunner,
) -> Result<PreemptOutcome> {
    let outcome = preempt(key, run, forge, jobs)
        .await
        .with_context(|| format!("Failed to take over PR {}", key.pr_num))?;
    report::mark_processing(forge, key.pr_num).await;
    Ok(outcome)
}

pub struct Pre;

#[async_trait]
impl CiCommand for Pre {
    fn name(&self) -> &'static str {
        "pre"
    }

    fn help(&self) -> &'static str {
        "prepare a pull request for the gate"
    }

    fn description(&self) -> &'static str {
        "Stop the previous gate run of a pull request if it is still \
         building, record this run and set the processing label"
    }

    fn declare_flags(&self, parser: clap::Command) -> clap::Command {
        PreArgs::augment_args(parser)
    }

    async fn execute(&self, ctx: &AppContext, matches: &ArgMatches) -> Result<()> {
        let args: PreArgs = parse_args(matches)?;
        let run = RunContext::from_env().context("Pre needs the job identity")?;
        let common = common_config(ctx)?;
        let forge = args.forge.client(&common)?;
        let jobs = args.jobs.client(&common)?;

        let outcome = prepare_pr(&args.lock_key(), &run, forge.as_ref(), jobs.as_ref()).await?;
        info!(pr = args.pr_num, ?outcome, "pull request taken over");
        Ok(())
    }
}
