//! `pr_check`: tell the pipeline which kinds of work a PR needs.

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{ArgMatches, Args};
use embci_core::classify::work_kinds;
use embci_core::config::{GateConfig, GATE_CONF};
use embci_core::{AppContext, CiCommand};
use embci_forge::ForgeClient;

use super::{common_config, load_or_default, parse_args, ForgeArgs};

#[derive(Debug, Clone, Args)]
pub struct PrCheckArgs {
    #[command(flatten)]
    pub forge: ForgeArgs,

    #[arg(long = "pr_num")]
    pub pr_num: u64,
}

/// `docs`, `code` or `docs code`; empty when the PR changes nothing.
pub async fn kinds_line(forge: &dyn ForgeClient, pr_num: u64, docs_prefix: &str) -> Result<String> {
    let files = forge
        .pr_files(pr_num)
        .await
        .with_context(|| format!("Failed to list files of PR {}", pr_num))?;
    let (docs, code) = work_kinds(&files, docs_prefix);
    let mut kinds = Vec::new();
    if docs {
        kinds.push("docs");
    }
    if code {
        kinds.push("code");
    }
    Ok(kinds.join(" "))
}

pub struct PrCheck;

#[async_trait]
impl CiCommand for PrCheck {
    fn name(&self) -> &'static str {
        "pr_check"
    }

    fn help(&self) -> &'static str {
        "check which work a pull request needs"
    }

    fn description(&self) -> &'static str {
        "Print `docs`, `code` or both, depending on the files the pull request changes"
    }

    fn declare_flags(&self, parser: clap::Command) -> clap::Command {
        PrCheckArgs::augment_args(parser)
    }

    async fn execute(&self, ctx: &AppContext, matches: &ArgMatches) -> Result<()> {
        let args: PrCheckArgs = parse_args(matches)?;
        let config: GateConfig = load_or_default(ctx, GATE_CONF)?;
        let forge = args.forge.client(&common_config(ctx)?)?;
        println!("{}", kinds_line(forge.as_ref(), args.pr_num, &config.docs_prefix).await?);
        Ok(())
    }
}
