//! `gate`: run the gate for one pull request.

use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{ArgMatches, Args};
use embci_core::config::{GateConfig, RunContext, GATE_CONF};
use embci_core::{AppContext, CiCommand};
use embci_gate::{GatePipeline, GateRequest};
use tracing::info;

use super::{common_config, load_or_default, parse_args, ForgeArgs, JobRunnerArgs};

pub const DEFAULT_GATE_TARGET: &str = "yocto-meta-openeuler";

#[derive(Debug, Clone, Args)]
pub struct GateArgs {
    /// Shared directory holding run records and the cron cache
    #[arg(short = 's', long = "share_dir")]
    pub share_dir: PathBuf,

    #[command(flatten)]
    pub forge: ForgeArgs,

    #[command(flatten)]
    pub jobs: JobRunnerArgs,

    #[arg(short = 'b', long = "branch", default_value = "master")]
    pub branch: String,

    #[arg(long = "pr_num")]
    pub pr_num: u64,

    /// Gate build task, `gate/<target>/run`
    #[arg(long = "target", default_value = DEFAULT_GATE_TARGET)]
    pub target: String,

    /// Parent of the PR checkout and `oebuild_workspace`
    #[arg(short = 'w', long = "workspace", env = "HOME")]
    pub workspace: PathBuf,

    /// Remove bitbake `tmp` after each board
    #[arg(long = "delete_tmp")]
    pub delete_tmp: bool,
}

impl GateArgs {
    pub fn request(&self) -> GateRequest {
        GateRequest {
            pr_num: self.pr_num,
            target: self.target.clone(),
            branch: self.branch.clone(),
            share_dir: self.share_dir.clone(),
            workspace: self.workspace.clone(),
            remote_url: self.forge.remote_url(),
            delete_tmp: self.delete_tmp,
        }
    }
}

pub struct Gate;

#[async_trait]
impl CiCommand for Gate {
    fn name(&self) -> &'static str {
        "gate"
    }

    fn help(&self) -> &'static str {
        "Handle pull request business"
    }

    fn description(&self) -> &'static str {
        "Gate a pull request: stop the previous run, check commits, build or \
         build docs, then comment and label the verdict"
    }

    fn declare_flags(&self, parser: clap::Command) -> clap::Command {
        GateArgs::augment_args(parser)
    }

    async fn execute(&self, ctx: &AppContext, matches: &ArgMatches) -> Result<()> {
        let args: GateArgs = parse_args(matches)?;
        let run = RunContext::from_env().context("Gate needs the job identity")?;
        let common = common_config(ctx)?;
        let config: GateConfig = load_or_default(ctx, GATE_CONF)?;

        let forge = args.forge.client(&common)?;
        let jobs = args.jobs.client(&common)?;
        let pipeline = GatePipeline::new(forge, jobs, ctx.extensions.clone(), run)
            .with_config(config)
            .with_conf_dir(ctx.paths.conf_dir.clone());

        let summary = pipeline.run(&args.request()).await;
        info!(pr = args.pr_num, verdict = %summary.verdict, rows = summary.table.rows.len(), "gate finished");
        anyhow::ensure!(
            summary.verdict.is_success(),
            "gate failed for PR {}",
            args.pr_num
        );
        Ok(())
    }
}
