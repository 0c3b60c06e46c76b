//! Platform build of an openEuler Embedded image.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use embci_core::capability::{Arch, Board, Build, BuildParameter, BuildRes};
use embci_core::config::GCC_DIR;
use embci_core::{BuildError, Outcome};
use tracing::{info, warn};

use super::oebuild::{self, GenerateOptions, Oebuild, WORKSPACE_NAME};
use super::{create_dir_all, exists, is_dir, remove_dir_if_exists};
use crate::error::{GateError, GateResult};
use crate::runner::SubprocessRunner;

/// Pre-fetched package sources shipped in the build container.
pub const PRE_SOURCE_DIR: &str = "/usr1/src";

/// Name the code checkout is linked under in `src/`.
const META_LAYER: &str = "yocto-meta-openeuler";

/// Build task registered at `tasks/build/openeuler_image`.
///
/// Unlike the gate build, every image is judged by the exit code of
/// `oebuild bitbake <image> -k` only.
pub struct OpenEulerImage {
    oebuild: Oebuild,
    pre_source_dir: PathBuf,
}

impl Default for OpenEulerImage {
    fn default() -> Self {
        Self {
            oebuild: Oebuild::default(),
            pre_source_dir: PathBuf::from(PRE_SOURCE_DIR),
        }
    }
}

impl OpenEulerImage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tool(mut self, program: impl Into<String>) -> Self {
        self.oebuild = Oebuild::new(program);
        self
    }

    pub fn with_pre_source_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.pre_source_dir = dir.into();
        self
    }

    async fn ensure_workspace(&self, param: &BuildParameter) -> GateResult<PathBuf> {
        let workspace = param.oebuild_workspace();
        let ready = oebuild::is_workspace(&workspace).await && is_dir(&workspace.join("src")).await;
        if !ready {
            remove_dir_if_exists(&workspace).await?;
            create_dir_all(&param.workspace).await?;
            self.oebuild.init(&param.workspace, WORKSPACE_NAME, None).await?;
        }
        Ok(workspace)
    }

    /// Link every directory of the pre-source dir into `src/`, keeping
    /// entries that already exist.
    async fn link_pre_sources(&self, src_dir: &Path) -> GateResult<()> {
        if !is_dir(&self.pre_source_dir).await {
            return Ok(());
        }
        let mut entries = tokio::fs::read_dir(&self.pre_source_dir)
            .await
            .map_err(|e| GateError::io(&self.pre_source_dir, e))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| GateError::io(&self.pre_source_dir, e))?
        {
            let path = entry.path();
            if !is_dir(&path).await {
                continue;
            }
            let link = src_dir.join(entry.file_name());
            if tokio::fs::symlink_metadata(&link).await.is_ok() {
                info!(package = ?entry.file_name(), "already present in src");
                continue;
            }
            tokio::fs::symlink(&path, &link)
                .await
                .map_err(|e| GateError::io(&link, e))?;
        }
        Ok(())
    }
}

/// Point `link` at `target`, replacing an older link.
async fn relink(target: &Path, link: &Path) -> GateResult<()> {
    if let Ok(meta) = tokio::fs::symlink_metadata(link).await {
        if meta.file_type().is_symlink() || meta.is_file() {
            tokio::fs::remove_file(link)
                .await
                .map_err(|e| GateError::io(link, e))?;
        } else {
            warn!(path = %link.display(), "real directory in place of the code link, keeping it");
            return Ok(());
        }
    }
    tokio::fs::symlink(target, link)
        .await
        .map_err(|e| GateError::io(link, e))
}

/// Lines appended to `local_conf` of the generated compile.yaml.
pub fn local_conf_extra(datetime: Option<&str>) -> String {
    let mut extra = String::from("\nINHERIT += \"rm_work\"\nRM_WORK_EXCLUDE += \"glog libflann\"\n");
    if let Some(dt) = datetime {
        extra.push_str(&format!("DATETIME = \"{}\"\n", dt));
    }
    extra
}

/// Keep the sstate option only when it names an existing directory.
async fn existing_dir(path: &Option<PathBuf>, flag: &str) -> Option<PathBuf> {
    let dir = path.as_ref()?;
    if is_dir(dir).await {
        Some(dir.clone())
    } else {
        warn!(flag, path = %dir.display(), "not a directory, option skipped");
        None
    }
}

#[async_trait]
impl Build for OpenEulerImage {
    async fn do_build(&self, param: &BuildParameter) -> Result<BuildRes, BuildError> {
        let platform = param
            .platform
            .as_deref()
            .ok_or_else(|| BuildError::MissingInput("platform".to_string()))?;
        let toolchain = param
            .toolchain
            .as_deref()
            .ok_or_else(|| BuildError::MissingInput("toolchain".to_string()))?;
        if param.images.is_empty() {
            return Err(BuildError::MissingInput("images".to_string()));
        }
        if !exists(&param.build_code).await {
            return Err(BuildError::MissingInput(param.build_code.display().to_string()));
        }

        let workspace = self.ensure_workspace(param).await?;
        let src_dir = workspace.join("src");
        relink(&param.build_code, &src_dir.join(META_LAYER)).await?;

        let build_dir = workspace.join("build").join(&param.directory);
        remove_dir_if_exists(&build_dir).await?;

        let mut opts = GenerateOptions::new(platform, Path::new(GCC_DIR).join(toolchain), &param.directory);
        opts.features = param.features.clone();
        opts.sstate_in = existing_dir(&param.sstate_cache_in, "sstate_cache_in").await;
        opts.sstate_out = existing_dir(&param.sstate_cache_out, "sstate_cache_out").await;
        self.oebuild.generate(&workspace, &opts).await?;

        let compile_path = oebuild::compile_yaml(&workspace, &param.directory);
        let mut compile = oebuild::read_value(&compile_path).await?;
        oebuild::append_local_conf(&mut compile, &local_conf_extra(param.datetime.as_deref()))?;
        let body = serde_yaml::to_string(&compile).map_err(GateError::from)?;
        tokio::fs::write(&compile_path, body).await?;

        self.link_pre_sources(&src_dir).await?;

        let mut boards = Vec::new();
        for image in &param.images {
            info!(directory = %param.directory, image = %image, "bitbake");
            let out = SubprocessRunner::stream(&self.oebuild.bitbake(&build_dir, image, &["-k"])).await?;
            let outcome = Outcome::from_success(out.success());
            if !outcome.is_success() {
                warn!(image = %image, exit = ?out.exit_code, "bitbake failed");
            }
            boards.push(Board::new(format!("{}({})", image, param.directory), outcome));
        }
        Ok(BuildRes::new(vec![Arch::new(param.arch.clone(), boards)]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_conf_extra() {
        let extra = local_conf_extra(Some("20240101"));
        assert!(extra.contains("INHERIT += \"rm_work\""));
        assert!(extra.contains("RM_WORK_EXCLUDE += \"glog libflann\""));
        assert!(extra.ends_with("DATETIME = \"20240101\"\n"));
        assert!(!local_conf_extra(None).contains("DATETIME"));
    }

    #[tokio::test]
    async fn test_missing_platform_is_rejected() {
        let err = OpenEulerImage::new()
            .do_build(&BuildParameter::default())
            .await
            .unwrap_err();
        assert!(matches!(err, BuildError::MissingInput(ref what) if what == "platform"));
    }

    #[tokio::test]
    async fn test_relink_replaces_old_link() {
        let tmp = tempfile::tempdir().unwrap();
        let a = tmp.path().join("a");
        let b = tmp.path().join("b");
        std::fs::create_dir_all(&a).unwrap();
        std::fs::create_dir_all(&b).unwrap();
        let link = tmp.path().join("link");

        relink(&a, &link).await.unwrap();
        relink(&b, &link).await.unwrap();
        assert_eq!(std::fs::read_link(&link).unwrap(), b);
    }
}
