//! Python lint of the changed files.

use async_trait::async_trait;
use embci_core::capability::{Check, CheckParameter};
use embci_core::{CheckError, Outcome};
use tracing::{info, warn};

use super::exists;
use crate::runner::{CommandSpec, SubprocessRunner};

pub const MAX_LINE_LENGTH: &str = "100";

/// Check task registered at `tasks/check/code_check`.
///
/// Every changed `.py` file still present in the checkout goes through
/// `flake8 <file> --max-line-length 100`.
#[derive(Debug, Clone, Default)]
pub struct CodeLint;

impl CodeLint {
    async fn ensure_flake8() -> Result<(), CheckError> {
        let show = SubprocessRunner::capture(&CommandSpec::new("pip").args(["show", "flake8"])).await?;
        if show.success() {
            return Ok(());
        }
        info!("installing flake8");
        SubprocessRunner::checked(&CommandSpec::new("pip").args(["install", "flake8"]))
            .await
            .map_err(|e| CheckError::Subprocess {
                command: "pip install flake8".to_string(),
                reason: e.to_string(),
            })?;
        Ok(())
    }
}

/// Changed Python files, in order, without duplicates.
pub fn python_files(param: &CheckParameter) -> Vec<String> {
    let mut files: Vec<String> = Vec::new();
    for f in &param.diff_files {
        if f.filename.ends_with(".py") && !files.contains(&f.filename) {
            files.push(f.filename.clone());
        }
    }
    files
}

#[async_trait]
impl Check for CodeLint {
    async fn do_check(&self, param: &CheckParameter) -> Result<Outcome, CheckError> {
        let files = python_files(param);
        if files.is_empty() {
            info!("no python files changed");
            return Ok(Outcome::Success);
        }
        Self::ensure_flake8().await?;

        let mut outcome = Outcome::Success;
        for file in files {
            if !exists(&param.repo_dir.join(&file)).await {
                continue;
            }
            let spec = CommandSpec::new("flake8")
                .arg(file.as_str())
                .args(["--max-line-length", MAX_LINE_LENGTH])
                .current_dir(&param.repo_dir);
            let out = SubprocessRunner::capture(&spec).await?;
            if !out.success() {
                warn!(file = %file, "flake8 reported problems");
                println!("=============================================");
                println!("{}", out.output);
                println!("=============================================");
                outcome = Outcome::Failure;
            }
        }
        Ok(outcome)
    }
}
