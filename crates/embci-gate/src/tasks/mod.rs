//! Built-in build, check and test tasks.
//!
//! Each task is a zero-argument constructible type implementing one
//! capability trait. They are registered under their task path in
//! [`crate::registry`].

pub mod board_suite;
pub mod code_lint;
pub mod commit_msg;
pub mod commit_scope;
pub mod oebuild;
pub mod oebuild_wheel;
pub mod openeuler_doc;
pub mod openeuler_image;
pub mod qemu_boot;
pub mod uniproton_gate;
pub mod yocto_gate;

use std::path::Path;

use embci_core::{BuildError, CheckError, TestError};
use tracing::debug;

use crate::error::{GateError, GateResult};
use crate::runner::{CommandSpec, SubprocessRunner};

pub use board_suite::BoardSuite;
pub use code_lint::CodeLint;
pub use commit_msg::CommitMsg;
pub use commit_scope::CommitScope;
pub use oebuild_wheel::OebuildWheel;
pub use openeuler_doc::OpenEulerDoc;
pub use openeuler_image::OpenEulerImage;
pub use qemu_boot::QemuBoot;
pub use uniproton_gate::UniProtonGate;
pub use yocto_gate::YoctoGate;

// ---------------------------------------------------------------------------
// Error mapping into capability errors
// ---------------------------------------------------------------------------

impl From<GateError> for BuildError {
    fn from(err: GateError) -> Self {
        match err {
            GateError::Command { command, output } => BuildError::Subprocess {
                command,
                code: None,
                output,
            },
            GateError::Config(e) => BuildError::Config(e),
            other => BuildError::Failed(other.to_string()),
        }
    }
}

impl From<GateError> for CheckError {
    fn from(err: GateError) -> Self {
        match err {
            GateError::Command { command, output } => CheckError::Subprocess {
                command,
                reason: output,
            },
            GateError::Forge(e) => CheckError::Forge(e),
            other => CheckError::Failed(other.to_string()),
        }
    }
}

impl From<GateError> for TestError {
    fn from(err: GateError) -> Self {
        TestError::Failed(err.to_string())
    }
}

// ---------------------------------------------------------------------------
// Filesystem helpers
// ---------------------------------------------------------------------------

pub(crate) async fn exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

pub(crate) async fn is_dir(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false)
}

pub(crate) async fn remove_dir_if_exists(path: &Path) -> GateResult<()> {
    if exists(path).await {
        debug!(path = %path.display(), "removing");
        tokio::fs::remove_dir_all(path)
            .await
            .map_err(|e| GateError::io(path, e))?;
    }
    Ok(())
}

pub(crate) async fn create_dir_all(path: &Path) -> GateResult<()> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|e| GateError::io(path, e))
}

/// Copy a directory tree, keeping links and modes.
pub(crate) async fn copy_dir(from: &Path, to: &Path) -> GateResult<()> {
    if let Some(parent) = to.parent() {
        create_dir_all(parent).await?;
    }
    let spec = CommandSpec::new("cp")
        .arg("-a")
        .arg(from.display().to_string())
        .arg(to.display().to_string());
    SubprocessRunner::capture(&spec).await.and_then(|out| {
        if out.success() {
            Ok(())
        } else {
            Err(GateError::Command {
                command: out.command,
                output: out.output,
            })
        }
    })
}
