//! Daily build of a branch from a fresh workspace.
//!
//! Unlike the cron pre-warm, the daily build starts from nothing: the job
//! home's `oebuild_workspace` is re-initialised, the meta layer is cloned
//! and every board of `ci.yaml` is generated with its layers taken from the
//! manifest. `not_use_repos` then keeps bitbake from fetching them again.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use embci_core::config::CronConfig;
use serde::Serialize;
use tracing::{info, warn};

use crate::cron::{bitbake_board, BuildFailure};
use crate::error::GateResult;
use crate::fetch::{GitFetcher, SourceFetcher};
use crate::tasks::oebuild::{self, GenerateOptions, Oebuild, WORKSPACE_NAME};
use crate::tasks::yocto_gate::fetch_manifest_layers;
use crate::tasks::{create_dir_all, remove_dir_if_exists};

pub const META_REPO: &str = "yocto-meta-openeuler";
pub const META_REMOTE: &str = "https://gitee.com/openeuler/yocto-meta-openeuler.git";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyRequest {
    /// Job home; the build runs in `<home>/oebuild_workspace`
    pub home: PathBuf,
    pub branch: String,
    pub delete_tmp: bool,
}

impl DailyRequest {
    pub fn new(home: impl Into<PathBuf>, branch: &str) -> Self {
        Self {
            home: home.into(),
            branch: branch.to_string(),
            delete_tmp: false,
        }
    }

    pub fn workspace(&self) -> PathBuf {
        self.home.join(WORKSPACE_NAME)
    }
}

pub struct DailyBuild {
    oebuild: Oebuild,
    fetcher: Arc<dyn SourceFetcher>,
    config: CronConfig,
}

impl DailyBuild {
    pub fn new(config: CronConfig) -> Self {
        Self {
            oebuild: Oebuild::default(),
            fetcher: Arc::new(GitFetcher::new()),
            config,
        }
    }

    pub fn with_tool(mut self, program: impl Into<String>) -> Self {
        self.oebuild = Oebuild::new(program);
        self
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn SourceFetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    /// Fresh workspace with the meta layer of `req.branch` in `src/`.
    async fn prepare(&self, req: &DailyRequest) -> GateResult<(PathBuf, PathBuf)> {
        let workspace = req.workspace();
        remove_dir_if_exists(&workspace).await?;
        create_dir_all(&req.home).await?;
        self.oebuild.init(&req.home, WORKSPACE_NAME, Some(&req.branch)).await?;

        let meta_dir = workspace.join("src").join(META_REPO);
        info!(repo = META_REPO, branch = %req.branch, "cloning meta layer");
        self.fetcher
            .clone_branch(META_REMOTE, &meta_dir, &req.branch, 1)
            .await?;
        Ok((workspace, meta_dir))
    }

    /// Build every board; returns the failed targets.
    ///
    /// Init, clone and generate failures are errors. Bitbake failures are
    /// judged by the last output line and only collected.
    pub async fn run(&self, req: &DailyRequest) -> GateResult<Vec<BuildFailure>> {
        let (workspace, meta_dir) = self.prepare(req).await?;

        let mut failures = Vec::new();
        for arch in &self.config.build_list {
            for board in &arch.board {
                let mut opts = GenerateOptions::new(&board.platform, arch.toolchain_dir(), &board.directory);
                opts.features = board.feature.iter().map(|f| f.name.clone()).collect();
                self.oebuild.generate(&workspace, &opts).await?;

                fetch_manifest_layers(self.fetcher.as_ref(), &workspace, &meta_dir, &board.directory).await?;
                oebuild::disable_repo_fetch(&oebuild::compile_yaml(&workspace, &board.directory)).await?;

                let build_dir = workspace.join("build").join(&board.directory);
                let generate = self.oebuild.generate_line(&opts);
                failures.extend(bitbake_board(&self.oebuild, &build_dir, arch, board, &generate).await?);

                if req.delete_tmp {
                    if let Err(e) = remove_dir_if_exists(&build_dir.join("tmp")).await {
                        warn!(error = %e, "could not remove tmp");
                    }
                }
            }
        }
        Ok(failures)
    }
}

#[derive(Debug, Default, Serialize)]
struct FailedBoard {
    generate: String,
    target: Vec<String>,
}

/// Issue body for failed daily builds: YAML grouped by arch then build
/// directory, followed by a link to the console log.
pub fn failure_report(failures: &[BuildFailure], console_url: &str) -> GateResult<String> {
    let mut grouped: BTreeMap<&str, BTreeMap<&str, FailedBoard>> = BTreeMap::new();
    for failure in failures {
        let board = grouped
            .entry(failure.arch.as_str())
            .or_default()
            .entry(failure.directory.as_str())
            .or_insert_with(|| FailedBoard {
                generate: failure.generate.clone(),
                target: Vec::new(),
            });
        board.target.push(format!("bitbake {}", failure.target));
    }
    let body = serde_yaml::to_string(&grouped)?;
    Ok(format!(
        "{}\n\nplease click <a href={}>here</a> for detail",
        body, console_url
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(arch: &str, directory: &str, target: &str) -> BuildFailure {
        BuildFailure {
            arch: arch.to_string(),
            directory: directory.to_string(),
            generate: format!("oebuild generate -d {}", directory),
            target: target.to_string(),
        }
    }

    #[test]
    fn test_failure_report_groups_by_board() {
        let failures = vec![
            failure("aarch64", "qemu-aarch64", "openeuler-image"),
            failure("x86-64", "x86-64", "openeuler-image"),
            failure("aarch64", "qemu-aarch64", "openeuler-image-tiny"),
        ];
        let body = failure_report(&failures, "https://ci.example.org/job/daily/3/console").unwrap();

        let (yaml, link) = body.split_once("\n\n").unwrap();
        let value: serde_yaml::Value = serde_yaml::from_str(yaml).unwrap();
        let board = &value["aarch64"]["qemu-aarch64"];
        assert_eq!(board["generate"].as_str(), Some("oebuild generate -d qemu-aarch64"));
        let targets: Vec<_> = board["target"]
            .as_sequence()
            .unwrap()
            .iter()
            .filter_map(|t| t.as_str())
            .collect();
        assert_eq!(targets, vec!["bitbake openeuler-image", "bitbake openeuler-image-tiny"]);
        assert_eq!(value["x86-64"]["x86-64"]["target"][0].as_str(), Some("bitbake openeuler-image"));
        assert_eq!(
            link.trim_start(),
            "please click <a href=https://ci.example.org/job/daily/3/console>here</a> for detail"
        );
    }

    #[test]
    fn test_workspace_under_home() {
        let req = DailyRequest::new("/home/jenkins", "master");
        assert_eq!(req.workspace(), PathBuf::from("/home/jenkins/oebuild_workspace"));
        assert!(!req.delete_tmp);
    }
}
