//! `cloneRepo`: check out a repository by pull request or by version.

use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{ArgMatches, Args};
use embci_core::{AppContext, CiCommand};
use embci_gate::fetch::DEFAULT_PR_REF;
use embci_gate::{GitFetcher, SourceFetcher};
use tracing::info;

use super::parse_args;

#[derive(Debug, Clone, Args)]
pub struct CloneRepoArgs {
    #[arg(short = 'r', long = "remote_url")]
    pub remote_url: String,

    /// Directory the repository is checked out under
    #[arg(short = 'w', long = "workspace")]
    pub workspace: Option<PathBuf>,

    /// Checkout directory name
    #[arg(short = 'p', long = "repo")]
    pub repo: String,

    #[arg(long = "pr_num")]
    pub pr_num: Option<u64>,

    /// Pull request ref namespace
    #[arg(long = "pr_type", default_value = DEFAULT_PR_REF)]
    pub pr_type: String,

    /// Tag, branch or sha when no PR is given
    #[arg(short = 'v', long = "version")]
    pub version: Option<String>,

    #[arg(long = "depth", default_value_t = 1)]
    pub depth: usize,
}

/// Check out per `args`; returns the checkout directory.
pub async fn clone_repo(args: &CloneRepoArgs, fetcher: &dyn SourceFetcher) -> Result<PathBuf> {
    let workspace = match &args.workspace {
        Some(dir) => {
            tokio::fs::create_dir_all(dir)
                .await
                .with_context(|| format!("Failed to create {}", dir.display()))?;
            dir.clone()
        }
        None => std::env::current_dir().context("Failed to read the current directory")?,
    };
    let dest = workspace.join(&args.repo);

    match (args.pr_num, &args.version) {
        (Some(pr), _) => {
            // fetch_pr adds one commit on top of the PR commits it is given
            fetcher
                .fetch_pr(&args.remote_url, &dest, pr, &args.pr_type, args.depth.saturating_sub(1))
                .await?
        }
        (None, Some(version)) => {
            fetcher
                .clone_version(&args.remote_url, &dest, version, args.depth)
                .await?
        }
        (None, None) => anyhow::bail!("either --pr_num or --version is required"),
    }
    info!(dest = %dest.display(), "repository checked out");
    Ok(dest)
}

pub struct CloneRepo;

#[async_trait]
impl CiCommand for CloneRepo {
    fn name(&self) -> &'static str {
        "cloneRepo"
    }

    fn help(&self) -> &'static str {
        "download repo code"
    }

    fn description(&self) -> &'static str {
        "Download a repository by pull request or by version, with a given depth"
    }

    fn declare_flags(&self, parser: clap::Command) -> clap::Command {
        CloneRepoArgs::augment_args(parser)
    }

    async fn execute(&self, _ctx: &AppContext, matches: &ArgMatches) -> Result<()> {
        let args: CloneRepoArgs = parse_args(matches)?;
        clone_repo(&args, &GitFetcher::new()).await?;
        Ok(())
    }
}
