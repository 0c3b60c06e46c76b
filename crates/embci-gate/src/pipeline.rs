//! Gate orchestration for one pull request.
//!
//! ```text
//! Preempt -> Announce -> Fetch -> Classify -> CodeCheck -> BuildOrDoc -> Aggregate -> Report
//! ```
//!
//! Stages run strictly in order. A stage that fails with an error does not
//! abort the run: the error is logged, recorded as a FAILURE row named
//! after the stage and the remaining stages that do not depend on it still
//! run. Report is always reached, so a PR never stays in `ci_processing`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use embci_core::capability::{self, BuildParameter, CheckParameter};
use embci_core::classify::classify;
use embci_core::config::{GateConfig, RunContext};
use embci_core::report::{self, CheckRow, CheckTable};
use embci_core::{ChangeKind, ExtensionLoader, Outcome};
use embci_forge::{ForgeClient, JobRunner, PrCommit, PrFile};
use tracing::{error, info, warn};

use crate::error::GateResult;
use crate::fetch::{GitFetcher, SourceFetcher, DEFAULT_PR_REF};
use crate::preempt::{preempt, PreemptOutcome, RunLockKey};
use crate::registry::{self, RUN_SYMBOL};
use crate::tasks::openeuler_doc::DOC_BUILD_CHECK;

pub const FETCH_ROW: &str = "fetch";
pub const COMMIT_SCOPE_ROW: &str = "check_commit_scope";
pub const COMMIT_MSG_ROW: &str = "check_commit_msg";

/// Gate stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateStage {
    Preempt,
    Announce,
    Fetch,
    Classify,
    CodeCheck,
    BuildOrDoc,
    Aggregate,
    Report,
}

impl std::fmt::Display for GateStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            GateStage::Preempt => "preempt",
            GateStage::Announce => "announce",
            GateStage::Fetch => "fetch",
            GateStage::Classify => "classify",
            GateStage::CodeCheck => "code_check",
            GateStage::BuildOrDoc => "build_or_doc",
            GateStage::Aggregate => "aggregate",
            GateStage::Report => "report",
        };
        f.write_str(s)
    }
}

/// What to gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateRequest {
    pub pr_num: u64,
    /// Gate build target, e.g. `yocto-meta-openeuler`
    pub target: String,
    pub branch: String,
    pub share_dir: PathBuf,
    /// Parent of the PR checkout and of `oebuild_workspace`
    pub workspace: PathBuf,
    pub remote_url: String,
    pub delete_tmp: bool,
}

/// Outcome of a gate run.
#[derive(Debug, Clone)]
pub struct GateSummary {
    pub preempt: Option<PreemptOutcome>,
    pub kind: Option<ChangeKind>,
    pub table: CheckTable,
    pub verdict: Outcome,
}

/// PR data gathered by the Fetch stage.
struct Fetched {
    commits: Vec<PrCommit>,
    files: Vec<PrFile>,
    repo_dir: PathBuf,
}

/// Drives the gate stages against one forge and job runner.
pub struct GatePipeline {
    forge: Arc<dyn ForgeClient>,
    jobs: Arc<dyn JobRunner>,
    extensions: Arc<ExtensionLoader>,
    fetcher: Arc<dyn SourceFetcher>,
    run: RunContext,
    config: GateConfig,
    conf_dir: PathBuf,
}

impl GatePipeline {
    pub fn new(
        forge: Arc<dyn ForgeClient>,
        jobs: Arc<dyn JobRunner>,
        extensions: Arc<ExtensionLoader>,
        run: RunContext,
    ) -> Self {
        let conf_dir = extensions.app_root().join("conf");
        Self {
            forge,
            jobs,
            extensions,
            fetcher: Arc::new(GitFetcher::new()),
            run,
            config: GateConfig::default(),
            conf_dir,
        }
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn SourceFetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    pub fn with_config(mut self, config: GateConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_conf_dir(mut self, conf_dir: impl Into<PathBuf>) -> Self {
        self.conf_dir = conf_dir.into();
        self
    }

    /// Run every stage for `req` and report the verdict on the PR.
    pub async fn run(&self, req: &GateRequest) -> GateSummary {
        let started = Instant::now();
        let pr = req.pr_num;
        let mut table = CheckTable::new();

        // Preempt
        let key = RunLockKey::new(&req.share_dir, self.forge.repo(), self.forge.owner(), pr);
        let preempted = match preempt(&key, &self.run, self.forge.as_ref(), self.jobs.as_ref()).await {
            Ok(outcome) => {
                info!(pr, stage = %GateStage::Preempt, ?outcome, "run record updated");
                Some(outcome)
            }
            Err(e) => {
                warn!(pr, stage = %GateStage::Preempt, error = %e, "could not take over the PR");
                None
            }
        };

        // Announce
        info!(pr, stage = %GateStage::Announce, "announcing");
        if !self.forge.comment_pr(pr, &report::announce_comment(&self.run)).await {
            warn!(pr, "announce comment not posted");
        }
        report::mark_processing(self.forge.as_ref(), pr).await;

        // Fetch
        let fetched = match self.fetch(req).await {
            Ok(f) => Some(f),
            Err(e) => {
                error!(pr, stage = %GateStage::Fetch, error = %e, "fetch failed");
                table.push(CheckRow::new(FETCH_ROW, Outcome::Failure).with_log(self.run.console_url()));
                None
            }
        };

        let mut kind = None;
        if let Some(fetched) = fetched {
            // Classify
            let k = classify(&fetched.files, &self.config.docs_prefix);
            info!(pr, stage = %GateStage::Classify, kind = ?k, files = fetched.files.len(), "classified");
            kind = Some(k);

            // CodeCheck
            let param = CheckParameter {
                pr_num: pr,
                owner: self.forge.owner().to_string(),
                repo: self.forge.repo().to_string(),
                repo_dir: fetched.repo_dir.clone(),
                conf_dir: self.conf_dir.clone(),
                docs_prefix: self.config.docs_prefix.clone(),
                commits: fetched.commits,
                diff_files: fetched.files,
                forge: Arc::clone(&self.forge),
            };
            for (row, task) in [(COMMIT_SCOPE_ROW, "commit_scope"), (COMMIT_MSG_ROW, "commit_msg")] {
                let outcome = self.run_check(task, &param).await;
                info!(pr, stage = %GateStage::CodeCheck, check = row, %outcome, "check finished");
                table.push(CheckRow::new(row, outcome).with_log(self.run.console_url()));
            }

            // BuildOrDoc
            let build_param = BuildParameter {
                workspace: req.workspace.clone(),
                build_code: fetched.repo_dir,
                share_dir: req.share_dir.clone(),
                conf_dir: self.conf_dir.clone(),
                pr_num: Some(pr),
                branch: req.branch.clone(),
                delete_tmp: req.delete_tmp,
                build_check: self.config.build_check_for(&req.target).to_vec(),
                docs_prefix: self.config.docs_prefix.clone(),
                ..Default::default()
            };
            match k {
                ChangeKind::DocsOnly => {
                    let path = registry::build_task_path("openeuler_doc");
                    self.run_build(&path, DOC_BUILD_CHECK, &build_param, &mut table).await;
                }
                ChangeKind::Code => {
                    let path = registry::gate_task_path(&req.target);
                    self.run_build(&path, &req.target, &build_param, &mut table).await;
                }
            }
        }

        // Aggregate
        let elapsed = started.elapsed().as_millis() as u64;
        let table = table.with_duration(Some(report::format_duration_ms(elapsed)));
        let verdict = table.verdict();
        info!(pr, stage = %GateStage::Aggregate, rows = table.rows.len(), %verdict, "aggregated");

        // Report
        if !self.forge.comment_pr(pr, &table.gate_comment(&self.run)).await {
            warn!(pr, stage = %GateStage::Report, "result comment not posted");
        }
        report::apply_verdict(self.forge.as_ref(), pr, verdict).await;
        info!(pr, stage = %GateStage::Report, %verdict, "gate finished");

        GateSummary {
            preempt: preempted,
            kind,
            table,
            verdict,
        }
    }

    async fn fetch(&self, req: &GateRequest) -> GateResult<Fetched> {
        let pr = req.pr_num;
        let commits = self.forge.pr_commits(pr).await?;
        let files = self.forge.pr_files(pr).await?;
        let repo_dir = req.workspace.join(self.forge.repo());
        info!(
            pr,
            stage = %GateStage::Fetch,
            commits = commits.len(),
            dest = %repo_dir.display(),
            "fetching pull request"
        );
        self.fetcher
            .fetch_pr(&req.remote_url, &repo_dir, pr, DEFAULT_PR_REF, commits.len())
            .await?;
        Ok(Fetched {
            commits,
            files,
            repo_dir,
        })
    }

    async fn run_check(&self, task: &str, param: &CheckParameter) -> Outcome {
        let path = registry::check_task_path(task);
        let check = match self.extensions.load_check(&path, RUN_SYMBOL) {
            Ok(c) => c,
            Err(e) => {
                error!(task, error = %e, "check task unavailable");
                return Outcome::Failure;
            }
        };
        match capability::check(check.as_ref(), param).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(task, error = %e, "check task failed");
                Outcome::Failure
            }
        }
    }

    /// Run a build task; its boards become rows, an error becomes one
    /// FAILURE row named `fallback_row`.
    async fn run_build(
        &self,
        path: &std::path::Path,
        fallback_row: &str,
        param: &BuildParameter,
        table: &mut CheckTable,
    ) {
        let result = match self.extensions.load_build(path, RUN_SYMBOL) {
            Ok(task) => capability::build(task.as_ref(), param)
                .await
                .map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        match result {
            Ok(res) => {
                info!(stage = %GateStage::BuildOrDoc, boards = res.leaves().count(), outcome = %res.outcome(), "build finished");
                table.push_build(&res);
            }
            Err(e) => {
                error!(stage = %GateStage::BuildOrDoc, task = %path.display(), error = %e, "build failed");
                table.push(CheckRow::new(fallback_row, Outcome::Failure).with_log(self.run.console_url()));
            }
        }
    }
}
