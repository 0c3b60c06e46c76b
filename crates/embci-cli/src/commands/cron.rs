//! `cron`: pre-warm the shared sstate cache of a branch.

use std::path::PathBuf;

use anyhow::Result;
use async_trait::async_trait;
use clap::{ArgMatches, Args};
use embci_core::config::{CronConfig, CRON_CONF};
use embci_core::{AppContext, CiCommand};
use embci_gate::cron::DEFAULT_TMP_DIR;
use embci_gate::{CronRequest, CronRunner};
use tracing::{error, info};

use super::{load_or_default, parse_args};

#[derive(Debug, Clone, Args)]
pub struct CronArgs {
    #[arg(short = 's', long = "share_dir")]
    pub share_dir: PathBuf,

    #[arg(short = 'b', long = "branch", default_value = "master")]
    pub branch: String,

    /// Parent of the per-board bitbake tmp directories
    #[arg(short = 'm', long = "tmp_dir", default_value = DEFAULT_TMP_DIR)]
    pub tmp_dir: PathBuf,

    #[arg(long = "delete_tmp")]
    pub delete_tmp: bool,

    /// Build tool executable
    #[arg(long = "oebuild", default_value = "oebuild", hide = true)]
    pub oebuild: String,
}

pub struct Cron;

#[async_trait]
impl CiCommand for Cron {
    fn name(&self) -> &'static str {
        "cron"
    }

    fn help(&self) -> &'static str {
        "this is a CI timed task"
    }

    fn description(&self) -> &'static str {
        "Build every board of cron.yaml in the branch cron workspace to \
         refresh the sstate cache the gate builds read from"
    }

    fn declare_flags(&self, parser: clap::Command) -> clap::Command {
        CronArgs::augment_args(parser)
    }

    async fn execute(&self, ctx: &AppContext, matches: &ArgMatches) -> Result<()> {
        let args: CronArgs = parse_args(matches)?;
        let config: CronConfig = load_or_default(ctx, CRON_CONF)?;

        let mut req = CronRequest::new(&args.share_dir, &args.branch);
        req.tmp_dir = args.tmp_dir.clone();
        req.delete_tmp = args.delete_tmp;

        let failures = CronRunner::new(config)
            .with_tool(args.oebuild.clone())
            .run(&req)
            .await?;
        if failures.is_empty() {
            info!(branch = %args.branch, "cron build successful");
            return Ok(());
        }
        for failure in &failures {
            error!("{}", failure);
        }
        anyhow::bail!("{} cron target(s) failed", failures.len())
    }
}
