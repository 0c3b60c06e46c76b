//! Sphinx documentation build.

use async_trait::async_trait;
use embci_core::capability::{Build, BuildParameter, BuildRes};
use embci_core::{BuildError, Outcome};
use tracing::{error, info};

use super::is_dir;
use crate::runner::{CommandSpec, SubprocessRunner};

/// Row name of the documentation build in gate reports.
pub const DOC_BUILD_CHECK: &str = "doc_build_check";

/// Build task registered at `tasks/build/openeuler_doc`.
///
/// Runs `make html SPHINXOPTS=-W` in the documentation root of the code
/// (`docs_prefix`, `docs/` by default); warnings are errors.
/// Success iff the exit code is 0.
#[derive(Debug, Clone)]
pub struct OpenEulerDoc {
    make: String,
}

impl Default for OpenEulerDoc {
    fn default() -> Self {
        Self {
            make: "make".to_string(),
        }
    }
}

impl OpenEulerDoc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_make(mut self, program: impl Into<String>) -> Self {
        self.make = program.into();
        self
    }
}

#[async_trait]
impl Build for OpenEulerDoc {
    async fn do_build(&self, param: &BuildParameter) -> Result<BuildRes, BuildError> {
        let doc_dir = param.doc_dir();
        if !is_dir(&doc_dir).await {
            return Err(BuildError::MissingInput(format!(
                "documentation directory {}",
                doc_dir.display()
            )));
        }
        let spec = CommandSpec::new(&self.make)
            .args(["html", "SPHINXOPTS=-W"])
            .current_dir(&doc_dir);
        let out = SubprocessRunner::capture(&spec).await?;
        println!("{}", out.output);
        let outcome = Outcome::from_success(out.success());
        if outcome.is_success() {
            info!(dir = %doc_dir.display(), "documentation built");
        } else {
            error!(dir = %doc_dir.display(), exit = ?out.exit_code, "documentation build failed");
        }
        let arch = if param.arch.is_empty() { "docs" } else { param.arch.as_str() };
        Ok(BuildRes::single(arch, DOC_BUILD_CHECK, outcome))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_docs_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let param = BuildParameter {
            build_code: tmp.path().to_path_buf(),
            ..Default::default()
        };
        let err = OpenEulerDoc::new().do_build(&param).await.unwrap_err();
        assert!(matches!(err, BuildError::MissingInput(_)));
    }

    #[tokio::test]
    async fn test_exit_code_decides() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("docs")).unwrap();
        let param = BuildParameter {
            build_code: tmp.path().to_path_buf(),
            ..Default::default()
        };

        let ok = OpenEulerDoc::new().with_make("true").do_build(&param).await.unwrap();
        assert_eq!(ok.outcome(), Outcome::Success);
        assert_eq!(ok.leaves().next().unwrap().1.name, DOC_BUILD_CHECK);

        let ko = OpenEulerDoc::new().with_make("false").do_build(&param).await.unwrap();
        assert_eq!(ko.outcome(), Outcome::Failure);
    }

    #[tokio::test]
    async fn test_doc_dir_from_docs_prefix() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("documentation")).unwrap();
        let mut param = BuildParameter {
            build_code: tmp.path().to_path_buf(),
            docs_prefix: "documentation/".to_string(),
            ..Default::default()
        };
        let res = OpenEulerDoc::new().with_make("true").do_build(&param).await.unwrap();
        assert_eq!(res.outcome(), Outcome::Success);

        param.docs_prefix = "docs/".to_string();
        let err = OpenEulerDoc::new().with_make("true").do_build(&param).await.unwrap_err();
        assert!(matches!(err, BuildError::MissingInput(_)));
    }
}
