//! Source checkout through `git`.

use std::path::Path;

use async_trait::async_trait;
use tracing::info;

use crate::error::{GateError, GateResult};
use crate::runner::{CommandSpec, SubprocessRunner};

/// Ref namespace of a pull request on the forge.
pub const DEFAULT_PR_REF: &str = "MERGE";

/// Fetches sources into a local directory.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    /// Check out the `pr_ref` of pull request `pr_num` into `dest`,
    /// deep enough to reach its first commit (`commits + 1`).
    async fn fetch_pr(
        &self,
        remote_url: &str,
        dest: &Path,
        pr_num: u64,
        pr_ref: &str,
        commits: usize,
    ) -> GateResult<()>;

    /// Shallow clone of `branch`.
    async fn clone_branch(
        &self,
        remote_url: &str,
        dest: &Path,
        branch: &str,
        depth: usize,
    ) -> GateResult<()>;

    /// Shallow checkout of a tag, branch or sha.
    async fn clone_version(
        &self,
        remote_url: &str,
        dest: &Path,
        version: &str,
        depth: usize,
    ) -> GateResult<()>;
}

/// [`SourceFetcher`] backed by the `git` executable.
#[derive(Debug, Clone)]
pub struct GitFetcher {
    git: String,
}

impl Default for GitFetcher {
    fn default() -> Self {
        Self {
            git: "git".to_string(),
        }
    }
}

impl GitFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    async fn git(&self, cwd: &Path, args: &[&str]) -> GateResult<()> {
        let spec = CommandSpec::new(&self.git)
            .args(args.iter().copied())
            .current_dir(cwd);
        SubprocessRunner::checked(&spec).await.map(|_| ())
    }

    async fn fresh_dir(dest: &Path) -> GateResult<()> {
        if tokio::fs::try_exists(dest).await.unwrap_or(false) {
            tokio::fs::remove_dir_all(dest)
                .await
                .map_err(|e| GateError::io(dest, e))?;
        }
        tokio::fs::create_dir_all(dest)
            .await
            .map_err(|e| GateError::io(dest, e))
    }
}

#[async_trait]
impl SourceFetcher for GitFetcher {
    async fn fetch_pr(
        &self,
        remote_url: &str,
        dest: &Path,
        pr_num: u64,
        pr_ref: &str,
        commits: usize,
    ) -> GateResult<()> {
        let depth = commits.max(1) + 1;
        info!(pr = pr_num, depth, dest = %dest.display(), "fetching pull request");
        Self::fresh_dir(dest).await?;
        let refspec = format!("pull/{}/{}:pr_{}", pr_num, pr_ref, pr_num);
        let depth_arg = format!("--depth={}", depth);
        let branch = format!("pr_{}", pr_num);
        self.git(dest, &["init"]).await?;
        self.git(dest, &["remote", "add", "origin", remote_url]).await?;
        self.git(dest, &["fetch", "origin", &refspec, &depth_arg]).await?;
        self.git(dest, &["checkout", &branch]).await
    }

    async fn clone_branch(
        &self,
        remote_url: &str,
        dest: &Path,
        branch: &str,
        depth: usize,
    ) -> GateResult<()> {
        if tokio::fs::try_exists(dest).await.unwrap_or(false) {
            tokio::fs::remove_dir_all(dest)
                .await
                .map_err(|e| GateError::io(dest, e))?;
        }
        let parent = dest.parent().unwrap_or_else(|| Path::new("."));
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| GateError::io(parent, e))?;
        let dest_arg = dest.display().to_string();
        let depth_arg = depth.max(1).to_string();
        info!(url = remote_url, branch, "cloning");
        self.git(
            parent,
            &["clone", remote_url, &dest_arg, "-b", branch, "--depth", &depth_arg],
        )
        .await
    }

    async fn clone_version(
        &self,
        remote_url: &str,
        dest: &Path,
        version: &str,
        depth: usize,
    ) -> GateResult<()> {
        info!(url = remote_url, version, "fetching version");
        Self::fresh_dir(dest).await?;
        let depth_arg = format!("--depth={}", depth.max(1));
        self.git(dest, &["init"]).await?;
        self.git(dest, &["remote", "add", "origin", remote_url]).await?;
        self.git(dest, &["fetch", "origin", version, &depth_arg]).await?;
        self.git(dest, &["checkout", "FETCH_HEAD"]).await
    }
}
