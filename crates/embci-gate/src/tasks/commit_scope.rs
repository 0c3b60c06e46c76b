//! A commit must not mix documentation and other changes.

use async_trait::async_trait;
use embci_core::capability::{Check, CheckParameter};
use embci_core::classify::mixed_commits;
use embci_core::{CheckError, Outcome};
use tracing::warn;

/// Check task registered at `tasks/check/commit_scope`.
#[derive(Debug, Clone, Default)]
pub struct CommitScope;

#[async_trait]
impl Check for CommitScope {
    async fn do_check(&self, param: &CheckParameter) -> Result<Outcome, CheckError> {
        if param.diff_files.is_empty() {
            warn!(pr = param.pr_num, "pull request has no changed files");
            return Ok(Outcome::Failure);
        }
        let mixed = mixed_commits(&param.diff_files, &param.docs_prefix);
        for commit in &mixed {
            println!("commit {} mixes documentation and code:", commit.sha);
            for p in &commit.doc_paths {
                println!("    doc:  {}", p);
            }
            for p in &commit.other_paths {
                println!("    code: {}", p);
            }
        }
        if !mixed.is_empty() {
            println!(
                "documentation under {} must be changed in separate commits",
                param.docs_prefix
            );
        }
        Ok(Outcome::from_success(mixed.is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embci_forge::fakes::MemoryForge;
    use embci_forge::PrFile;
    use std::sync::Arc;

    fn param(files: Vec<PrFile>) -> CheckParameter {
        CheckParameter {
            pr_num: 1,
            owner: "owner".to_string(),
            repo: "repo".to_string(),
            repo_dir: std::path::PathBuf::from("."),
            conf_dir: std::path::PathBuf::from("conf"),
            docs_prefix: "docs/".to_string(),
            commits: vec![],
            diff_files: files,
            forge: Arc::new(MemoryForge::default()),
        }
    }

    #[tokio::test]
    async fn test_separate_commits_pass() {
        let p = param(vec![PrFile::new("a", "docs/intro.md"), PrFile::new("b", "src/main.c")]);
        assert_eq!(CommitScope.do_check(&p).await.unwrap(), Outcome::Success);
    }

    #[tokio::test]
    async fn test_mixed_commit_fails() {
        let p = param(vec![PrFile::new("a", "docs/a.md"), PrFile::new("a", "src/b.c")]);
        assert_eq!(CommitScope.do_check(&p).await.unwrap(), Outcome::Failure);
    }

    #[tokio::test]
    async fn test_no_files_fails() {
        assert_eq!(CommitScope.do_check(&param(vec![])).await.unwrap(), Outcome::Failure);
    }
}
