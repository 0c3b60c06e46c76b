//! Pull-request classification: docs-only versus code.
//!
//! All functions here are pure over the changed-file list.

use embci_forge::PrFile;
use serde::{Deserialize, Serialize};

/// Binary classification of a pull request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    DocsOnly,
    Code,
}

/// Whether `path` lies under the documentation prefix.
pub fn is_doc_path(path: &str, docs_prefix: &str) -> bool {
    let prefix = docs_prefix.trim_end_matches('/');
    if prefix.is_empty() {
        return false;
    }
    let path = path.trim_start_matches("./");
    path == prefix || path.strip_prefix(prefix).is_some_and(|rest| rest.starts_with('/'))
}

/// Classify a pull request from its changed files.
///
/// An empty list is `Code`: a PR that changes nothing must still go
/// through the full gate.
pub fn classify(files: &[PrFile], docs_prefix: &str) -> ChangeKind {
    if files.is_empty() {
        return ChangeKind::Code;
    }
    let docs_only = files
        .iter()
        .flat_map(|f| f.paths())
        .all(|p| is_doc_path(p, docs_prefix));
    if docs_only {
        ChangeKind::DocsOnly
    } else {
        ChangeKind::Code
    }
}

/// Files grouped by commit sha, in first-seen order, both old and new
/// paths included.
pub fn group_by_commit(files: &[PrFile]) -> Vec<(String, Vec<String>)> {
    let mut groups: Vec<(String, Vec<String>)> = Vec::new();
    for f in files {
        let idx = match groups.iter().position(|(sha, _)| *sha == f.sha) {
            Some(i) => i,
            None => {
                groups.push((f.sha.clone(), Vec::new()));
                groups.len() - 1
            }
        };
        let paths = &mut groups[idx].1;
        for p in f.paths() {
            if !paths.iter().any(|q| q == p) {
                paths.push(p.to_string());
            }
        }
    }
    groups
}

/// A commit touching both documentation and other paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MixedCommit {
    pub sha: String,
    pub doc_paths: Vec<String>,
    pub other_paths: Vec<String>,
}

/// Every commit that mixes doc and non-doc changes.
pub fn mixed_commits(files: &[PrFile], docs_prefix: &str) -> Vec<MixedCommit> {
    group_by_commit(files)
        .into_iter()
        .filter_map(|(sha, paths)| {
            let (doc_paths, other_paths): (Vec<_>, Vec<_>) =
                paths.into_iter().partition(|p| is_doc_path(p, docs_prefix));
            if doc_paths.is_empty() || other_paths.is_empty() {
                None
            } else {
                Some(MixedCommit {
                    sha,
                    doc_paths,
                    other_paths,
                })
            }
        })
        .collect()
}

/// Work a PR needs: `(docs, code)`.
pub fn work_kinds(files: &[PrFile], docs_prefix: &str) -> (bool, bool) {
    let mut docs = false;
    let mut code = false;
    for p in files.iter().flat_map(|f| f.paths()) {
        if is_doc_path(p, docs_prefix) {
            docs = true;
        } else {
            code = true;
        }
    }
    (docs, code)
}
