//! `comment`: publish check results produced by pipeline steps.
//!
//! Each `--checks` value is base64-encoded JSON
//! `{"name", "action", "result", "log_path"}`; `log_path` is relative to
//! the build page.

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{ArgAction, ArgMatches, Args, ValueEnum};
use embci_core::config::RunContext;
use embci_core::report::{self, CheckRow, CheckTable, CI_CAPTION};
use embci_core::{AppContext, CiCommand, Outcome};
use embci_forge::ForgeClient;
use serde::Deserialize;
use tracing::{info, warn};

use super::{common_config, decode_base64, parse_args, ForgeArgs};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Method {
    /// Comment the table on the PR and set the verdict label
    Gate,
    /// Open an issue when a scheduled build failed
    Ci,
}

/// One check item as emitted by pipeline scripts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CheckItem {
    pub name: String,
    pub action: String,
    pub result: String,
    pub log_path: String,
}

impl CheckItem {
    /// Decode one `--checks` value.
    pub fn decode(encoded: &str) -> Result<Self> {
        let raw = decode_base64(encoded)?;
        serde_json::from_str(&raw).with_context(|| format!("Invalid check item {}", raw))
    }

    pub fn into_row(self, run: &RunContext) -> CheckRow {
        let mut row = CheckRow::new(self.name, Outcome::from_word(&self.result))
            .with_log(run.link(&self.log_path));
        if !self.action.is_empty() {
            row = row.with_action(self.action);
        }
        row
    }
}

#[derive(Debug, Clone, Args)]
pub struct CommentArgs {
    #[arg(short = 'm', long = "method", value_enum)]
    pub method: Method,

    #[command(flatten)]
    pub forge: ForgeArgs,

    /// Run duration in milliseconds
    #[arg(long = "duration_time")]
    pub duration_time: Option<u64>,

    #[arg(long = "pr_num")]
    pub pr_num: Option<u64>,

    #[arg(short = 'b', long = "branch", default_value = "master")]
    pub branch: String,

    #[arg(long = "checks", action = ArgAction::Append)]
    pub checks: Vec<String>,
}

impl CommentArgs {
    pub fn table(&self, run: &RunContext) -> Result<CheckTable> {
        let mut table = CheckTable::new().with_duration(self.duration_time.map(report::format_duration_ms));
        for encoded in &self.checks {
            table.push(CheckItem::decode(encoded)?.into_row(run));
        }
        Ok(table)
    }
}

/// Publish `table` through `forge` according to `args.method`.
pub async fn publish(
    forge: &dyn ForgeClient,
    run: &RunContext,
    args: &CommentArgs,
    table: &CheckTable,
) -> Result<Outcome> {
    let verdict = table.verdict();
    match args.method {
        Method::Gate => {
            let pr = args.pr_num.context("--pr_num is required for gate comments")?;
            if !forge.comment_pr(pr, &table.gate_comment(run)).await {
                warn!(pr, "result comment not posted");
            }
            report::apply_verdict(forge, pr, verdict).await;
        }
        Method::Ci => {
            if verdict.is_success() {
                info!(branch = %args.branch, "all checks passed, no issue opened");
            } else {
                let title = report::ci_issue_title(&args.branch);
                if !forge.create_issue(&title, &table.render_html(CI_CAPTION)).await {
                    warn!(branch = %args.branch, "failure issue not created");
                }
            }
        }
    }
    Ok(verdict)
}

pub struct Comment;

#[async_trait]
impl CiCommand for Comment {
    fn name(&self) -> &'static str {
        "comment"
    }

    fn help(&self) -> &'static str {
        "format gate or ci result"
    }

    fn description(&self) -> &'static str {
        "This command is to format result that come from gate or ci"
    }

    fn declare_flags(&self, parser: clap::Command) -> clap::Command {
        CommentArgs::augment_args(parser)
    }

    async fn execute(&self, ctx: &AppContext, matches: &ArgMatches) -> Result<()> {
        let args: CommentArgs = parse_args(matches)?;
        let run = RunContext::from_env().context("Comment needs the job identity")?;
        let table = args.table(&run)?;
        let forge = args.forge.client(&common_config(ctx)?)?;
        let verdict = publish(forge.as_ref(), &run, &args, &table).await?;
        info!(method = ?args.method, %verdict, rows = table.rows.len(), "results published");
        Ok(())
    }
}
