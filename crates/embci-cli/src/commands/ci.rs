//! `ci`: daily build of a branch.

use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{ArgMatches, Args};
use embci_core::config::{CronConfig, RunContext, CI_CONF};
use embci_core::report;
use embci_core::{AppContext, CiCommand};
use embci_forge::ForgeClient;
use embci_gate::daily::failure_report;
use embci_gate::{BuildFailure, DailyBuild, DailyRequest};
use tracing::{error, info, warn};

use super::{common_config, load_or_default, parse_args, ForgeArgs};

#[derive(Debug, Clone, Args)]
pub struct CiArgs {
    #[arg(short = 'b', long = "branch", default_value = "master")]
    pub branch: String,

    #[command(flatten)]
    pub forge: ForgeArgs,

    /// Open an issue listing the failed targets
    #[arg(long = "send_failed", alias = "send_faild")]
    pub send_failed: bool,

    /// Remove bitbake `tmp` after each board
    #[arg(long = "delete_tmp")]
    pub delete_tmp: bool,

    /// Parent of `oebuild_workspace`
    #[arg(short = 'w', long = "workspace", env = "HOME")]
    pub workspace: PathBuf,

    /// Build tool executable
    #[arg(long = "oebuild", default_value = "oebuild", hide = true)]
    pub oebuild: String,
}

impl CiArgs {
    pub fn request(&self) -> DailyRequest {
        let mut req = DailyRequest::new(&self.workspace, &self.branch);
        req.delete_tmp = self.delete_tmp;
        req
    }
}

/// Open the failure issue for `branch`. Returns whether the forge took it.
pub async fn report_failures(
    forge: &dyn ForgeClient,
    run: &RunContext,
    branch: &str,
    failures: &[BuildFailure],
) -> Result<bool> {
    let body = failure_report(failures, &run.console_url()).context("Failed to render the failure report")?;
    let created = forge.create_issue(&report::ci_issue_title(branch), &body).await;
    if !created {
        warn!(branch, "failure issue not created");
    }
    Ok(created)
}

pub struct Ci;

#[async_trait]
impl CiCommand for Ci {
    fn name(&self) -> &'static str {
        "ci"
    }

    fn help(&self) -> &'static str {
        "for daily build"
    }

    fn description(&self) -> &'static str {
        "Periodically build the release images of ci.yaml in a fresh \
         workspace and report the failed targets"
    }

    fn declare_flags(&self, parser: clap::Command) -> clap::Command {
        CiArgs::augment_args(parser)
    }

    async fn execute(&self, ctx: &AppContext, matches: &ArgMatches) -> Result<()> {
        let args: CiArgs = parse_args(matches)?;
        let config: CronConfig = load_or_default(ctx, CI_CONF)?;

        let failures = DailyBuild::new(config)
            .with_tool(args.oebuild.clone())
            .run(&args.request())
            .await?;
        if failures.is_empty() {
            info!(branch = %args.branch, "all build successful");
            return Ok(());
        }
        for failure in &failures {
            error!(arch = %failure.arch, "{}", failure);
        }
        if args.send_failed {
            let run = RunContext::from_env().context("Reporting failures needs the job identity")?;
            let forge = args.forge.client(&common_config(ctx)?)?;
            report_failures(forge.as_ref(), &run, &args.branch, &failures).await?;
        }
        anyhow::bail!("{} daily target(s) failed", failures.len())
    }
}
