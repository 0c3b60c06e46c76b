//! Client trait definitions for the external collaborators
//!
//! - `ForgeClient`: pull-request reads (commits, changed files) and writes
//!   (comments, labels, issues) against the Git forge.
//! - `JobRunner`: build-info query and stop request against the CI job runner.
//!
//! Both traits are async and backend-agnostic. In-memory fakes are provided
//! for testing via the `fakes` module.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ForgeResult;

// ---------------------------------------------------------------------------
// ForgeClient — pull request API
// ---------------------------------------------------------------------------

/// One commit of a pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrCommit {
    pub sha: String,
}

impl PrCommit {
    pub fn new(sha: impl Into<String>) -> Self {
        Self { sha: sha.into() }
    }
}

/// Old/new path pair of a changed file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilePatch {
    #[serde(default)]
    pub new_path: String,
    #[serde(default)]
    pub old_path: String,
}

/// One changed file of a pull request, attributed to the commit that touched it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrFile {
    /// Commit that changed the file.
    pub sha: String,
    /// Path as shown by the forge.
    pub filename: String,
    #[serde(default)]
    pub patch: Option<FilePatch>,
}

impl PrFile {
    /// A file changed in `sha` whose old and new paths are both `path`.
    pub fn new(sha: impl Into<String>, path: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            sha: sha.into(),
            filename: path.clone(),
            patch: Some(FilePatch {
                new_path: path.clone(),
                old_path: path,
            }),
        }
    }

    /// Every path this change touches: new and old path, or the plain
    /// filename when the forge sent no patch section.
    pub fn paths(&self) -> Vec<&str> {
        match &self.patch {
            Some(patch) => {
                let mut paths = Vec::with_capacity(2);
                for p in [patch.new_path.as_str(), patch.old_path.as_str()] {
                    if !p.is_empty() && !paths.contains(&p) {
                        paths.push(p);
                    }
                }
                if paths.is_empty() {
                    paths.push(self.filename.as_str());
                }
                paths
            }
            None => vec![self.filename.as_str()],
        }
    }
}

/// Git forge pull-request client.
///
/// Reads return `ForgeResult`; writes degrade to `false` on any non-success
/// status and log the response instead of raising.
#[async_trait]
pub trait ForgeClient: Send + Sync {
    /// Repository owner (namespace).
    fn owner(&self) -> &str;

    /// Repository name.
    fn repo(&self) -> &str;

    /// Commits of a pull request, oldest first.
    async fn pr_commits(&self, pr_num: u64) -> ForgeResult<Vec<PrCommit>>;

    /// Changed files of a pull request.
    async fn pr_files(&self, pr_num: u64) -> ForgeResult<Vec<PrFile>>;

    /// Raw detail of a single commit.
    async fn commit_info(&self, sha: &str) -> ForgeResult<serde_json::Value>;

    /// Post a comment on a pull request.
    async fn comment_pr(&self, pr_num: u64, body: &str) -> bool;

    /// Add labels to a pull request.
    async fn add_labels(&self, pr_num: u64, labels: &[&str]) -> bool;

    /// Remove labels from a pull request.
    async fn remove_labels(&self, pr_num: u64, labels: &[&str]) -> bool;

    /// Open an issue in the repository.
    async fn create_issue(&self, title: &str, body: &str) -> bool;
}

// ---------------------------------------------------------------------------
// JobRunner — CI job control plane
// ---------------------------------------------------------------------------

/// Subset of a job-runner build description the orchestrator needs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildInfo {
    #[serde(default)]
    pub number: u64,
    /// True while the build is still executing.
    #[serde(default)]
    pub building: bool,
    #[serde(default)]
    pub result: Option<String>,
}

/// CI job-runner control client.
#[async_trait]
pub trait JobRunner: Send + Sync {
    /// Describe build `build_number` of `job_name`.
    async fn build_info(&self, job_name: &str, build_number: u64) -> ForgeResult<BuildInfo>;

    /// Ask the runner to stop a build. Fire-and-forget: returning `Ok` does
    /// not mean the build has stopped.
    async fn stop_build(&self, job_name: &str, build_number: u64) -> ForgeResult<()>;
}
