//! Scheduled pre-warm of the shared sstate cache.
//!
//! The cron workspace `<share>/cron/openeuler_<branch>` is the one gate
//! builds read their sstate cache from (see the yocto gate task). Every
//! board of `cron.yaml` is generated and every bitbake target built; failed
//! targets are collected and reported together at the end.

use std::fmt;
use std::path::{Path, PathBuf};

use embci_core::config::{ArchTarget, BoardTarget, CronConfig};
use serde::Serialize;
use tracing::{info, warn};

use crate::error::GateResult;
use crate::runner::{MarkerPolicy, SubprocessRunner};
use crate::tasks::oebuild::{self, GenerateOptions, Oebuild};
use crate::tasks::yocto_gate::{cron_workspace, CRON_WORKSPACE};
use crate::tasks::{create_dir_all, remove_dir_if_exists};

pub const DEFAULT_TMP_DIR: &str = "/home/jenkins/agent/openeuler_tmp";

/// Where and what to pre-build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronRequest {
    pub share_dir: PathBuf,
    pub branch: String,
    /// Parent of the per-board bitbake `TMPDIR`s
    pub tmp_dir: PathBuf,
    pub delete_tmp: bool,
}

impl CronRequest {
    pub fn new(share_dir: impl Into<PathBuf>, branch: &str) -> Self {
        Self {
            share_dir: share_dir.into(),
            branch: branch.to_string(),
            tmp_dir: PathBuf::from(DEFAULT_TMP_DIR),
            delete_tmp: false,
        }
    }

    /// `<share>/cron/openeuler_<branch>`
    pub fn workspace(&self) -> PathBuf {
        cron_workspace(&self.share_dir, &self.branch)
    }
}

/// One bitbake target whose last output line carried the failure marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildFailure {
    pub arch: String,
    pub directory: String,
    /// The generate invocation that produced the build directory
    pub generate: String,
    pub target: String,
}

impl fmt::Display for BuildFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "build {}->{} failed", self.directory, self.target)
    }
}

/// Bitbake every target of `board` in `build_dir`, judged by the last
/// output line. Failed targets are returned, not raised.
pub(crate) async fn bitbake_board(
    oebuild: &Oebuild,
    build_dir: &Path,
    arch: &ArchTarget,
    board: &BoardTarget,
    generate: &str,
) -> GateResult<Vec<BuildFailure>> {
    println!("========================={}==========================", board.directory);
    let mut failures = Vec::new();
    for target in &board.bitbake {
        let spec = oebuild.bitbake(build_dir, &target.target, &[]);
        let (_, outcome) = SubprocessRunner::judged(&spec, &MarkerPolicy::bitbake_last_line()).await?;
        if outcome.is_success() {
            info!(directory = %board.directory, recipe = %target.target, "bitbake successful");
            continue;
        }
        let failure = BuildFailure {
            arch: arch.arch.clone(),
            directory: board.directory.clone(),
            generate: generate.to_string(),
            target: target.target.clone(),
        };
        warn!("{}", failure);
        failures.push(failure);
    }
    Ok(failures)
}

pub struct CronRunner {
    oebuild: Oebuild,
    config: CronConfig,
}

impl CronRunner {
    pub fn new(config: CronConfig) -> Self {
        Self {
            oebuild: Oebuild::default(),
            config,
        }
    }

    pub fn with_tool(mut self, program: impl Into<String>) -> Self {
        self.oebuild = Oebuild::new(program);
        self
    }

    /// Make sure the branch workspace exists and its meta layer is current.
    async fn prepare(&self, req: &CronRequest) -> GateResult<PathBuf> {
        let workspace = req.workspace();
        if !oebuild::is_workspace(&workspace).await {
            remove_dir_if_exists(&workspace).await?;
            let parent = req.share_dir.join(CRON_WORKSPACE);
            create_dir_all(&parent).await?;
            let name = format!("openeuler_{}", req.branch);
            self.oebuild.init(&parent, &name, Some(&req.branch)).await?;
        }
        self.oebuild.update_meta(&workspace).await?;
        Ok(workspace)
    }

    /// Build everything; returns the failed targets.
    ///
    /// Tool failures of init, update and generate are errors. Bitbake
    /// failures are judged by the last output line and only collected.
    pub async fn run(&self, req: &CronRequest) -> GateResult<Vec<BuildFailure>> {
        create_dir_all(&req.tmp_dir).await?;
        let workspace = self.prepare(req).await?;

        let mut failures = Vec::new();
        for arch in &self.config.build_list {
            for board in &arch.board {
                let build_dir = workspace.join("build").join(&board.directory);
                delete_caches(&build_dir, &board.delete_cache_dirs()).await?;

                let tmp_dir = req.tmp_dir.join(&board.directory).join("tmp");
                let mut opts = GenerateOptions::new(&board.platform, arch.toolchain_dir(), &board.directory);
                opts.features = board.feature.iter().map(|f| f.name.clone()).collect();
                opts.tmp_dir = Some(tmp_dir.clone());
                self.oebuild.generate(&workspace, &opts).await?;

                let generate = self.oebuild.generate_line(&opts);
                failures.extend(bitbake_board(&self.oebuild, &build_dir, arch, board, &generate).await?);

                if req.delete_tmp {
                    if let Err(e) = remove_dir_if_exists(&tmp_dir).await {
                        warn!(error = %e, "could not remove tmp");
                    }
                }
            }
        }
        Ok(failures)
    }
}

/// Remove the listed cache directories under `build_dir`.
async fn delete_caches(build_dir: &Path, names: &[&str]) -> GateResult<()> {
    for name in names {
        let dir = build_dir.join(name);
        remove_dir_if_exists(&dir).await?;
        info!(dir = %dir.display(), "cache deleted");
    }
    Ok(())
}
