//! Python wheel of the oebuild tool.

use async_trait::async_trait;
use embci_core::capability::{Build, BuildParameter, BuildRes};
use embci_core::{BuildError, Outcome};
use tracing::info;

use crate::runner::{CommandSpec, SubprocessRunner};

/// Build task registered at `tasks/build/oebuild_wheel`.
#[derive(Debug, Clone, Default)]
pub struct OebuildWheel;

impl OebuildWheel {
    /// Install `wheel` when `pip show wheel` says it is missing.
    async fn ensure_wheel() -> Result<(), BuildError> {
        let show = SubprocessRunner::capture(&CommandSpec::new("pip").args(["show", "wheel"])).await?;
        if show.success() {
            return Ok(());
        }
        info!("installing wheel");
        SubprocessRunner::checked(&CommandSpec::new("pip").args(["install", "wheel"])).await?;
        Ok(())
    }
}

#[async_trait]
impl Build for OebuildWheel {
    async fn do_build(&self, param: &BuildParameter) -> Result<BuildRes, BuildError> {
        Self::ensure_wheel().await?;
        let spec = CommandSpec::new("python3")
            .args(["setup.py", "bdist_wheel"])
            .current_dir(&param.build_code);
        let out = SubprocessRunner::stream(&spec).await?;
        if !out.success() {
            return Err(BuildError::Subprocess {
                command: out.command,
                code: out.exit_code,
                output: out.last_line,
            });
        }
        Ok(BuildRes::single(&param.arch, "bdist_wheel", Outcome::Success))
    }
}
