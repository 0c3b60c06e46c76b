//! `codeCheck`: run one check task outside the gate.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{ArgMatches, Args};
use embci_core::capability::{self, CheckParameter};
use embci_core::config::{GateConfig, GATE_CONF};
use embci_core::{AppContext, CiCommand, Outcome};
use embci_forge::{ForgeClient, PrFile};
use embci_gate::registry::{check_task_path, RUN_SYMBOL};
use tracing::info;

use super::{common_config, load_or_default, parse_args, ForgeArgs};

#[derive(Debug, Clone, Args)]
pub struct CodeCheckArgs {
    /// Checkout the check runs in
    #[arg(short = 'c', long = "check_code")]
    pub check_code: Option<PathBuf>,

    /// Check task: commit_msg, commit_scope or code_check
    #[arg(long = "target")]
    pub target: String,

    #[command(flatten)]
    pub forge: ForgeArgs,

    #[arg(long = "pr_num")]
    pub pr_num: Option<u64>,

    /// Space-separated changed files; replaces the PR file list
    #[arg(long = "diff_files")]
    pub diff_files: Option<String>,
}

pub struct CodeCheck;

/// Run the selected check against `forge`.
pub async fn run_check(
    ctx: &AppContext,
    args: &CodeCheckArgs,
    forge: Arc<dyn ForgeClient>,
) -> Result<Outcome> {
    if let Some(dir) = &args.check_code {
        anyhow::ensure!(dir.is_dir(), "Code for check does not exist in {}", dir.display());
    }
    let config: GateConfig = load_or_default(ctx, GATE_CONF)?;

    let (commits, mut diff_files) = match args.pr_num {
        Some(pr) => (
            forge.pr_commits(pr).await.context("Failed to list PR commits")?,
            forge.pr_files(pr).await.context("Failed to list PR files")?,
        ),
        None => (Vec::new(), Vec::new()),
    };
    if let Some(raw) = &args.diff_files {
        diff_files = raw.split_whitespace().map(|p| PrFile::new("", p)).collect();
    }

    let repo_dir = match &args.check_code {
        Some(dir) => dir.clone(),
        None => std::env::current_dir().context("Failed to read the current directory")?,
    };
    let param = CheckParameter {
        pr_num: args.pr_num.unwrap_or_default(),
        owner: args.forge.owner.clone(),
        repo: args.forge.repo.clone(),
        repo_dir,
        conf_dir: ctx.paths.conf_dir.clone(),
        docs_prefix: config.docs_prefix,
        commits,
        diff_files,
        forge,
    };

    let task = ctx
        .extensions
        .load_check(&check_task_path(&args.target), RUN_SYMBOL)?;
    let outcome = capability::check(task.as_ref(), &param).await?;
    info!(task = %args.target, %outcome, "check finished");
    Ok(outcome)
}

#[async_trait]
impl CiCommand for CodeCheck {
    fn name(&self) -> &'static str {
        "codeCheck"
    }

    fn help(&self) -> &'static str {
        "Check code and commits"
    }

    fn description(&self) -> &'static str {
        "Run one check task (commit_msg, commit_scope, code_check) against a \
         pull request or a local checkout"
    }

    fn declare_flags(&self, parser: clap::Command) -> clap::Command {
        CodeCheckArgs::augment_args(parser)
    }

    async fn execute(&self, ctx: &AppContext, matches: &ArgMatches) -> Result<()> {
        let args: CodeCheckArgs = parse_args(matches)?;
        let forge = args.forge.client(&common_config(ctx)?)?;
        let outcome = run_check(ctx, &args, forge).await?;
        anyhow::ensure!(outcome.is_success(), "check {} failed", args.target);
        Ok(())
    }
}
