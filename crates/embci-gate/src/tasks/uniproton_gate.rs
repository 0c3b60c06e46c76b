//! Gate build of UniProton pull requests.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use embci_core::capability::{Arch, Board, Build, BuildParameter, BuildRes};
use embci_core::BuildError;
use tracing::{info, warn};

use super::{create_dir_all, exists};
use crate::error::{GateError, GateResult};
use crate::fetch::{GitFetcher, SourceFetcher};
use crate::runner::{CommandSpec, MarkerPolicy, SubprocessRunner, UNIPROTON_SUCCESS_MARKER};

pub const LIBBOUNDSCHECK_REPO: &str = "libboundscheck";
pub const LIBBOUNDSCHECK_URL: &str = "https://gitee.com/openeuler/libboundscheck.git";

/// Build task registered at `gate/UniProton/run`.
///
/// Every board is built with `python3 build.py <board>` in the checkout;
/// success iff the last output line carries the build script's success
/// banner.
pub struct UniProtonGate {
    python: String,
    fetcher: Arc<dyn SourceFetcher>,
}

impl Default for UniProtonGate {
    fn default() -> Self {
        Self {
            python: "python3".to_string(),
            fetcher: Arc::new(GitFetcher::new()),
        }
    }
}

impl UniProtonGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_python(mut self, program: impl Into<String>) -> Self {
        self.python = program.into();
        self
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn SourceFetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }
}

/// Copy the regular files of `from` into `to`.
async fn copy_files(from: &Path, to: &Path) -> GateResult<usize> {
    create_dir_all(to).await?;
    let mut entries = tokio::fs::read_dir(from)
        .await
        .map_err(|e| GateError::io(from, e))?;
    let mut copied = 0;
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| GateError::io(from, e))?
    {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let dest = to.join(entry.file_name());
        tokio::fs::copy(&path, &dest)
            .await
            .map_err(|e| GateError::io(&dest, e))?;
        copied += 1;
    }
    Ok(copied)
}

#[async_trait]
impl Build for UniProtonGate {
    async fn do_build(&self, param: &BuildParameter) -> Result<BuildRes, BuildError> {
        let libbounds = param.workspace.join(LIBBOUNDSCHECK_REPO);
        if !exists(&libbounds).await {
            self.fetcher
                .clone_branch(LIBBOUNDSCHECK_URL, &libbounds, "master", 1)
                .await?;
        }

        let repo = &param.build_code;
        let include = libbounds.join("include");
        let src = libbounds.join("src");
        for (from, to) in [
            (&include, repo.join("platform/libboundscheck/include")),
            (&include, repo.join("include")),
            (&src, repo.join("platform/libboundscheck/src")),
        ] {
            if let Err(e) = copy_files(from, &to).await {
                warn!(error = %e, "copying libboundscheck failed");
            }
        }

        let policy = MarkerPolicy::SuccessMarkerInLastLine(UNIPROTON_SUCCESS_MARKER.to_string());
        let mut archs = Vec::new();
        for arch in &param.build_check {
            let mut boards = Vec::new();
            for board in &arch.board {
                let spec = CommandSpec::new(&self.python)
                    .arg("build.py")
                    .arg(&board.name)
                    .current_dir(repo);
                let (_, outcome) = SubprocessRunner::judged(&spec, &policy).await?;
                info!(arch = %arch.arch, board = %board.name, %outcome, "board built");
                boards.push(Board::new(board.name.clone(), outcome));
            }
            archs.push(Arch::new(arch.arch.clone(), boards));
        }
        Ok(BuildRes::new(archs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embci_core::config::{ArchTarget, BoardTarget};
    use embci_core::Outcome;
    use std::os::unix::fs::PermissionsExt;

    fn board(name: &str) -> BoardTarget {
        BoardTarget {
            name: name.to_string(),
            platform: String::new(),
            directory: String::new(),
            image: vec![],
            feature: vec![],
            delete_cache: None,
            bitbake: vec![],
        }
    }

    #[tokio::test]
    async fn test_boards_judged_by_success_banner() {
        let tmp = tempfile::tempdir().unwrap();
        let workspace = tmp.path().to_path_buf();
        let libbounds = workspace.join(LIBBOUNDSCHECK_REPO);
        std::fs::create_dir_all(libbounds.join("include")).unwrap();
        std::fs::create_dir_all(libbounds.join("src")).unwrap();
        std::fs::write(libbounds.join("include/securec.h"), "/* h */").unwrap();
        std::fs::write(libbounds.join("src/memcpy_s.c"), "/* c */").unwrap();

        let repo = workspace.join("UniProton");
        std::fs::create_dir_all(&repo).unwrap();
        // stands in for `python3 build.py <board>`
        let script = workspace.join("fake-python");
        std::fs::write(
            &script,
            "#!/bin/sh\nif [ \"$2\" = m4 ]; then echo '#### all lib succeed! ####################'; else echo 'error: link failed'; fi\n",
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let param = BuildParameter {
            workspace: workspace.clone(),
            build_code: repo.clone(),
            build_check: vec![ArchTarget {
                arch: "arm".to_string(),
                toolchain: String::new(),
                board: vec![board("m4"), board("raspi4")],
            }],
            ..Default::default()
        };
        let task = UniProtonGate::new().with_python(script.display().to_string());
        let res = task.do_build(&param).await.unwrap();

        let leaves: Vec<_> = res.leaves().map(|(_, b)| (b.name.clone(), b.result)).collect();
        assert_eq!(
            leaves,
            vec![
                ("m4".to_string(), Outcome::Success),
                ("raspi4".to_string(), Outcome::Failure)
            ]
        );
        assert!(repo.join("include/securec.h").exists());
        assert!(repo.join("platform/libboundscheck/src/memcpy_s.c").exists());
    }
}
