//! Build, Check and Test capability interfaces.
//!
//! Each capability is an async trait with a single primitive (`do_build`,
//! `do_check`, `do_test`). Callers go through the free functions [`build`],
//! [`check`] and [`test`], which are transparent pass-throughs and give the
//! orchestrator one stable call site whatever task the extension loader
//! handed it.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use embci_forge::{ForgeClient, PrCommit, PrFile};
use serde::{Deserialize, Serialize};

use crate::config::{ArchTarget, DEFAULT_DOCS_PREFIX};
use crate::error::{BuildError, CheckError, TestError};
use crate::result::{aggregate, Outcome};

// ---------------------------------------------------------------------------
// Build result tree
// ---------------------------------------------------------------------------

/// One built target (image on a board).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Board {
    pub name: String,
    pub result: Outcome,
}

impl Board {
    pub fn new(name: impl Into<String>, result: Outcome) -> Self {
        Self {
            name: name.into(),
            result,
        }
    }
}

/// Boards grouped under one architecture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Arch {
    pub name: String,
    pub boards: Vec<Board>,
}

impl Arch {
    pub fn new(name: impl Into<String>, boards: Vec<Board>) -> Self {
        Self {
            name: name.into(),
            boards,
        }
    }
}

/// Root artifact of a build: architecture -> board results.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildRes {
    pub archs: Vec<Arch>,
}

impl BuildRes {
    pub fn new(archs: Vec<Arch>) -> Self {
        Self { archs }
    }

    /// Single-arch, single-board result.
    pub fn single(arch: &str, board: &str, result: Outcome) -> Self {
        Self::new(vec![Arch::new(arch, vec![Board::new(board, result)])])
    }

    /// Every board, paired with its architecture name.
    pub fn leaves(&self) -> impl Iterator<Item = (&str, &Board)> {
        self.archs
            .iter()
            .flat_map(|a| a.boards.iter().map(move |b| (a.name.as_str(), b)))
    }

    /// AND over every board.
    pub fn outcome(&self) -> Outcome {
        aggregate(self.leaves().map(|(_, b)| b.result))
    }
}

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

/// Input of a build task. Passed by reference and never mutated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildParameter {
    /// Parent of `oebuild_workspace`
    pub workspace: PathBuf,
    /// Source tree to build (PR checkout or `--build_code`)
    pub build_code: PathBuf,
    pub share_dir: PathBuf,
    pub conf_dir: PathBuf,
    pub arch: String,
    pub toolchain: Option<String>,
    pub platform: Option<String>,
    pub images: Vec<String>,
    pub features: Vec<String>,
    /// Build directory name under `oebuild_workspace/build`
    pub directory: String,
    pub datetime: Option<String>,
    pub sstate_cache_in: Option<PathBuf>,
    pub sstate_cache_out: Option<PathBuf>,
    pub pr_num: Option<u64>,
    pub branch: String,
    /// Remove `build/<dir>/tmp` after each board
    pub delete_tmp: bool,
    /// Arch/board matrix for gate builds
    pub build_check: Vec<ArchTarget>,
    /// Documentation root, the same prefix classification uses
    pub docs_prefix: String,
}

impl BuildParameter {
    pub fn oebuild_workspace(&self) -> PathBuf {
        self.workspace.join("oebuild_workspace")
    }

    /// `<build_code>/<docs_prefix>`, with `docs/` when unset.
    pub fn doc_dir(&self) -> PathBuf {
        let prefix = match self.docs_prefix.trim_matches('/') {
            "" => DEFAULT_DOCS_PREFIX.trim_end_matches('/'),
            p => p,
        };
        self.build_code.join(prefix)
    }
}

/// Input of a check task.
#[derive(Clone)]
pub struct CheckParameter {
    pub pr_num: u64,
    pub owner: String,
    pub repo: String,
    /// Local checkout the check runs in
    pub repo_dir: PathBuf,
    pub conf_dir: PathBuf,
    pub docs_prefix: String,
    pub commits: Vec<PrCommit>,
    pub diff_files: Vec<PrFile>,
    pub forge: Arc<dyn ForgeClient>,
}

impl std::fmt::Debug for CheckParameter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckParameter")
            .field("pr_num", &self.pr_num)
            .field("owner", &self.owner)
            .field("repo", &self.repo)
            .field("repo_dir", &self.repo_dir)
            .field("commits", &self.commits.len())
            .field("diff_files", &self.diff_files.len())
            .finish()
    }
}

/// Input of a test task.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TestParameter {
    pub arch: String,
    /// Build output root (contains `output/`)
    pub target_dir: PathBuf,
    pub conf_dir: PathBuf,
    /// Explicit command for simulator-style suites
    pub command: Vec<String>,
    /// Completion marker override
    pub marker: Option<String>,
    /// Upper bound for latency-style suites
    pub threshold: Option<f64>,
    pub watchdog: Option<Duration>,
}

// ---------------------------------------------------------------------------
// Capability traits
// ---------------------------------------------------------------------------

/// Produces build artifacts and reports one result per board.
#[async_trait]
pub trait Build: Send + Sync {
    async fn do_build(&self, param: &BuildParameter) -> Result<BuildRes, BuildError>;
}

/// Validates code or commits of a pull request.
#[async_trait]
pub trait Check: Send + Sync {
    async fn do_check(&self, param: &CheckParameter) -> Result<Outcome, CheckError>;
}

/// Runs a test suite against built artifacts.
#[async_trait]
pub trait Test: Send + Sync {
    async fn do_test(&self, param: &TestParameter) -> Result<Outcome, TestError>;
}

pub async fn build(task: &dyn Build, param: &BuildParameter) -> Result<BuildRes, BuildError> {
    task.do_build(param).await
}

pub async fn check(task: &dyn Check, param: &CheckParameter) -> Result<Outcome, CheckError> {
    task.do_check(param).await
}

pub async fn test(task: &dyn Test, param: &TestParameter) -> Result<Outcome, TestError> {
    task.do_test(param).await
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedBuild(BuildRes);

    #[async_trait]
    impl Build for FixedBuild {
        async fn do_build(&self, _param: &BuildParameter) -> Result<BuildRes, BuildError> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn test_build_wrapper_is_pass_through() {
        let res = BuildRes::new(vec![
            Arch::new("aarch64", vec![Board::new("img(qemu)", Outcome::Success)]),
            Arch::new("x86-64", vec![Board::new("img(x86)", Outcome::Failure)]),
        ]);
        let task = FixedBuild(res.clone());
        let param = BuildParameter::default();

        let direct = task.do_build(&param).await.unwrap();
        let wrapped = build(&task, &param).await.unwrap();
        assert_eq!(direct, wrapped);
        assert_eq!(wrapped, res);
    }

    #[test]
    fn test_build_res_outcome_and_leaves() {
        let res = BuildRes::new(vec![
            Arch::new("aarch64", vec![Board::new("a", Outcome::Success)]),
            Arch::new("riscv64", vec![]),
        ]);
        assert_eq!(res.outcome(), Outcome::Success);
        assert_eq!(res.leaves().count(), 1);

        let failed = BuildRes::single("arm32", "b", Outcome::Failure);
        assert_eq!(failed.outcome(), Outcome::Failure);
        let (arch, board) = failed.leaves().next().unwrap();
        assert_eq!(arch, "arm32");
        assert_eq!(board.name, "b");
    }

    #[test]
    fn test_oebuild_workspace_path() {
        let param = BuildParameter {
            workspace: PathBuf::from("/home/jenkins"),
            ..Default::default()
        };
        assert_eq!(
            param.oebuild_workspace(),
            PathBuf::from("/home/jenkins/oebuild_workspace")
        );
    }

    #[test]
    fn test_doc_dir_follows_prefix() {
        let mut param = BuildParameter {
            build_code: PathBuf::from("/src/repo"),
            ..Default::default()
        };
        assert_eq!(param.doc_dir(), PathBuf::from("/src/repo/docs"));
        param.docs_prefix = "documentation/".to_string();
        assert_eq!(param.doc_dir(), PathBuf::from("/src/repo/documentation"));
    }
}
