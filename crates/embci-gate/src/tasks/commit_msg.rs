//! Commit message lint through `gitlint`.

use std::path::PathBuf;

use async_trait::async_trait;
use embci_core::capability::{Check, CheckParameter};
use embci_core::config::GITLINT_CONF;
use embci_core::{CheckError, Outcome};
use tracing::{info, warn};

use super::exists;
use crate::runner::{CommandSpec, SubprocessRunner};

const COMMIT_FORMAT_HINT: &str = "\
commit specifications is:
scope: title

this is commit body

Signed-off-by: example example@xx.com
the following commits do not conform to the specifications:";

/// Check task registered at `tasks/check/commit_msg`.
///
/// Every commit is linted; any output from gitlint fails that commit.
#[derive(Debug, Clone)]
pub struct CommitMsg {
    gitlint: String,
}

impl Default for CommitMsg {
    fn default() -> Self {
        Self {
            gitlint: "gitlint".to_string(),
        }
    }
}

impl CommitMsg {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tool(mut self, program: impl Into<String>) -> Self {
        self.gitlint = program.into();
        self
    }

    /// Repository `.gitlint` if present, else the shipped one.
    async fn config_path(param: &CheckParameter) -> PathBuf {
        let local = param.repo_dir.join(GITLINT_CONF);
        if exists(&local).await {
            local
        } else {
            param.conf_dir.join(GITLINT_CONF)
        }
    }
}

#[async_trait]
impl Check for CommitMsg {
    async fn do_check(&self, param: &CheckParameter) -> Result<Outcome, CheckError> {
        let config = Self::config_path(param).await;
        info!(config = %config.display(), commits = param.commits.len(), "linting commit messages");

        let mut failed = Vec::new();
        for commit in &param.commits {
            let spec = CommandSpec::new(&self.gitlint)
                .args(["--commit", commit.sha.as_str(), "-C"])
                .arg(config.display().to_string())
                .current_dir(&param.repo_dir);
            let out = SubprocessRunner::capture(&spec).await?;
            let report = out.output.trim();
            if !report.is_empty() {
                failed.push((commit.sha.clone(), report.to_string()));
            }
        }

        if failed.is_empty() {
            return Ok(Outcome::Success);
        }
        println!("{}", COMMIT_FORMAT_HINT);
        println!("==============================================================");
        for (sha, report) in &failed {
            warn!(commit = %sha, "commit message rejected");
            println!("commit: {}", sha);
            println!("check result:\n{}", report);
            println!("==============================================================");
        }
        Ok(Outcome::Failure)
    }
}
