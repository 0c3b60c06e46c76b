//! Gate build of yocto-meta-openeuler pull requests.
//!
//! Re-creates the oebuild workspace, moves the PR checkout into `src/`,
//! copies the common layers from the branch cron workspace and builds every
//! image of every board in the gate matrix. A board result is
//! decided by the last line of `oebuild bitbake` only: FAILURE iff it
//! carries the bitbake failure marker, whatever the exit code.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use embci_core::capability::{Arch, Board, Build, BuildParameter, BuildRes};
use embci_core::BuildError;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::oebuild::{self, GenerateOptions, Oebuild, WORKSPACE_NAME};
use super::{copy_dir, create_dir_all, exists, is_dir, remove_dir_if_exists};
use crate::error::{GateError, GateResult};
use crate::fetch::{GitFetcher, SourceFetcher};
use crate::runner::{CommandSpec, MarkerPolicy, SubprocessRunner};

/// Directory under the share dir holding the cron workspaces.
pub const CRON_WORKSPACE: &str = "cron";

/// `<share>/cron/openeuler_<branch>`
pub fn cron_workspace(share_dir: &Path, branch: &str) -> PathBuf {
    share_dir.join(CRON_WORKSPACE).join(format!("openeuler_{}", branch))
}

#[derive(Debug, Deserialize)]
struct Manifest {
    #[serde(default)]
    manifest_list: BTreeMap<String, ManifestEntry>,
}

#[derive(Debug, Deserialize)]
struct ManifestEntry {
    remote_url: String,
    version: String,
}

/// Build task registered at `gate/yocto-meta-openeuler/run`.
pub struct YoctoGate {
    oebuild: Oebuild,
    fetcher: Arc<dyn SourceFetcher>,
}

impl Default for YoctoGate {
    fn default() -> Self {
        Self {
            oebuild: Oebuild::default(),
            fetcher: Arc::new(GitFetcher::new()),
        }
    }
}

impl YoctoGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use another `oebuild` executable.
    pub fn with_tool(mut self, program: impl Into<String>) -> Self {
        self.oebuild = Oebuild::new(program);
        self
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn SourceFetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    /// Sstate cache kept warm by the cron job for this board, if any.
    async fn cron_sstate(param: &BuildParameter, directory: &str) -> Option<PathBuf> {
        if let Some(dir) = &param.sstate_cache_in {
            return is_dir(dir).await.then(|| dir.clone());
        }
        let cache = cron_workspace(&param.share_dir, &param.branch)
            .join("build")
            .join(directory)
            .join("sstate-cache");
        is_dir(&cache).await.then_some(cache)
    }

    /// Copy the layers listed in the checkout's `.oebuild/common.yaml` from
    /// the cron workspace `src/`. Layers the cron workspace lacks are left
    /// to the manifest clone.
    async fn copy_common_layers(repo_dir: &Path, cron_src: &Path, src_dir: &Path) -> GateResult<()> {
        let common_path = repo_dir.join(".oebuild").join("common.yaml");
        if !exists(&common_path).await {
            debug!(path = %common_path.display(), "no common layer list");
            return Ok(());
        }
        let common = oebuild::read_value(&common_path).await?;
        for layer in oebuild::layer_names(&common) {
            let dest = src_dir.join(&layer);
            if exists(&dest).await {
                continue;
            }
            let from = cron_src.join(&layer);
            if !is_dir(&from).await {
                warn!(layer = %layer, cron = %cron_src.display(), "layer not in the cron workspace");
                continue;
            }
            info!(layer = %layer, "copying layer from the cron workspace");
            copy_dir(&from, &dest).await?;
        }
        Ok(())
    }

    async fn fetch_layers(&self, workspace: &Path, repo_dir: &Path, directory: &str) -> GateResult<()> {
        fetch_manifest_layers(self.fetcher.as_ref(), workspace, repo_dir, directory).await
    }
}

/// Clone the manifest layers a board's compile.yaml needs and that are not
/// in `<workspace>/src` yet. Without a manifest in `repo_dir` nothing is
/// cloned.
pub(crate) async fn fetch_manifest_layers(
    fetcher: &dyn SourceFetcher,
    workspace: &Path,
    repo_dir: &Path,
    directory: &str,
) -> GateResult<()> {
    let manifest_path = repo_dir.join(".oebuild").join("manifest.yaml");
    if !exists(&manifest_path).await {
        return Ok(());
    }
    let compile = oebuild::read_value(&oebuild::compile_yaml(workspace, directory)).await?;
    let raw = tokio::fs::read_to_string(&manifest_path)
        .await
        .map_err(|e| GateError::io(&manifest_path, e))?;
    let manifest: Manifest = serde_yaml::from_str(&raw)?;

    let src_dir = workspace.join("src");
    for layer in oebuild::layer_names(&compile) {
        let Some(entry) = manifest.manifest_list.get(&layer) else {
            continue;
        };
        let dest = src_dir.join(&layer);
        if exists(&dest).await {
            continue;
        }
        info!(layer = %layer, version = %entry.version, "cloning layer");
        fetcher
            .clone_version(&entry.remote_url, &dest, &entry.version, 1)
            .await?;
    }
    Ok(())
}

/// Move a directory, falling back to `mv` across filesystems.
pub(crate) async fn move_dir(from: &Path, to: &Path) -> GateResult<()> {
    if let Some(parent) = to.parent() {
        create_dir_all(parent).await?;
    }
    remove_dir_if_exists(to).await?;
    if tokio::fs::rename(from, to).await.is_ok() {
        return Ok(());
    }
    let spec = CommandSpec::new("mv")
        .arg(from.display().to_string())
        .arg(to.display().to_string());
    SubprocessRunner::checked(&spec).await.map(|_| ())
}

#[async_trait]
impl Build for YoctoGate {
    async fn do_build(&self, param: &BuildParameter) -> Result<BuildRes, BuildError> {
        let workspace = param.oebuild_workspace();
        remove_dir_if_exists(&workspace).await?;
        create_dir_all(&param.workspace).await?;
        self.oebuild.init(&param.workspace, WORKSPACE_NAME, None).await?;

        let repo_name = param
            .build_code
            .file_name()
            .ok_or_else(|| BuildError::MissingInput(param.build_code.display().to_string()))?;
        let src_dir = workspace.join("src");
        let repo_dir = src_dir.join(repo_name);
        move_dir(&param.build_code, &repo_dir).await?;
        let cron_src = cron_workspace(&param.share_dir, &param.branch).join("src");
        Self::copy_common_layers(&repo_dir, &cron_src, &src_dir).await?;

        let mut archs = Vec::new();
        for arch in &param.build_check {
            let mut boards = Vec::new();
            for board in &arch.board {
                let mut opts = GenerateOptions::new(&board.platform, arch.toolchain_dir(), &board.directory);
                opts.sstate_in = Self::cron_sstate(param, &board.directory).await;
                self.oebuild.generate(&workspace, &opts).await?;
                self.fetch_layers(&workspace, &repo_dir, &board.directory).await?;

                let build_dir = workspace.join("build").join(&board.directory);
                for image in &board.image {
                    let spec = self.oebuild.bitbake(&build_dir, &image.name, &[]);
                    let (_, outcome) =
                        SubprocessRunner::judged(&spec, &MarkerPolicy::bitbake_last_line()).await?;
                    info!(arch = %arch.arch, board = %board.name, image = %image.name, %outcome, "bitbake finished");
                    boards.push(Board::new(format!("{}({})", image.name, board.name), outcome));
                }

                if param.delete_tmp {
                    if let Err(e) = remove_dir_if_exists(&build_dir.join("tmp")).await {
                        warn!(error = %e, "could not remove tmp");
                    }
                }
            }
            archs.push(Arch::new(arch.arch.clone(), boards));
        }
        Ok(BuildRes::new(archs))
    }
}
