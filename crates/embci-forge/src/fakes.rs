//! In-memory fakes for the client traits (testing only)
//!
//! Provides `MemoryForge` and `MemoryJobRunner` that satisfy the trait
//! contracts without any network access and record every write.

use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{ForgeError, ForgeResult};
use crate::traits::*;

// ---------------------------------------------------------------------------
// MemoryForge
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct ForgeState {
    commits: HashMap<u64, Vec<PrCommit>>,
    files: HashMap<u64, Vec<PrFile>>,
    comments: Vec<(u64, String)>,
    labels: HashMap<u64, BTreeSet<String>>,
    issues: Vec<(String, String)>,
}

/// In-memory forge with seeded pull requests.
#[derive(Debug)]
pub struct MemoryForge {
    owner: String,
    repo: String,
    state: Mutex<ForgeState>,
}

impl Default for MemoryForge {
    fn default() -> Self {
        Self::new("owner", "repo")
    }
}

impl MemoryForge {
    pub fn new(owner: &str, repo: &str) -> Self {
        Self {
            owner: owner.to_string(),
            repo: repo.to_string(),
            state: Mutex::new(ForgeState::default()),
        }
    }

    /// Seed a pull request: commits are derived from the distinct file shas
    /// in first-seen order.
    pub fn with_pr(self, pr_num: u64, files: Vec<PrFile>) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            let mut commits: Vec<PrCommit> = Vec::new();
            for f in &files {
                if !commits.iter().any(|c| c.sha == f.sha) {
                    commits.push(PrCommit::new(f.sha.clone()));
                }
            }
            state.commits.insert(pr_num, commits);
            state.files.insert(pr_num, files);
        }
        self
    }

    pub fn comments(&self, pr_num: u64) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state
            .comments
            .iter()
            .filter(|(n, _)| *n == pr_num)
            .map(|(_, body)| body.clone())
            .collect()
    }

    pub fn labels(&self, pr_num: u64) -> BTreeSet<String> {
        let state = self.state.lock().unwrap();
        state.labels.get(&pr_num).cloned().unwrap_or_default()
    }

    pub fn issues(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().issues.clone()
    }
}

#[async_trait]
impl ForgeClient for MemoryForge {
    fn owner(&self) -> &str {
        &self.owner
    }

    fn repo(&self) -> &str {
        &self.repo
    }

    async fn pr_commits(&self, pr_num: u64) -> ForgeResult<Vec<PrCommit>> {
        let state = self.state.lock().unwrap();
        state
            .commits
            .get(&pr_num)
            .cloned()
            .ok_or_else(|| not_found(pr_num, "commits"))
    }

    async fn pr_files(&self, pr_num: u64) -> ForgeResult<Vec<PrFile>> {
        let state = self.state.lock().unwrap();
        state
            .files
            .get(&pr_num)
            .cloned()
            .ok_or_else(|| not_found(pr_num, "files"))
    }

    async fn commit_info(&self, sha: &str) -> ForgeResult<serde_json::Value> {
        Ok(serde_json::json!({ "sha": sha }))
    }

    async fn comment_pr(&self, pr_num: u64, body: &str) -> bool {
        let mut state = self.state.lock().unwrap();
        state.comments.push((pr_num, body.to_string()));
        true
    }

    async fn add_labels(&self, pr_num: u64, labels: &[&str]) -> bool {
        let mut state = self.state.lock().unwrap();
        let set = state.labels.entry(pr_num).or_default();
        for l in labels {
            set.insert(l.to_string());
        }
        true
    }

    async fn remove_labels(&self, pr_num: u64, labels: &[&str]) -> bool {
        let mut state = self.state.lock().unwrap();
        if let Some(set) = state.labels.get_mut(&pr_num) {
            for l in labels {
                set.remove(*l);
            }
        }
        true
    }

    async fn create_issue(&self, title: &str, body: &str) -> bool {
        let mut state = self.state.lock().unwrap();
        state.issues.push((title.to_string(), body.to_string()));
        true
    }
}

fn not_found(pr_num: u64, what: &str) -> ForgeError {
    ForgeError::Status {
        status: 404,
        url: format!("memory://pulls/{}/{}", pr_num, what),
        body: "not found".to_string(),
    }
}

// ---------------------------------------------------------------------------
// MemoryJobRunner
// ---------------------------------------------------------------------------

/// In-memory job runner. Builds are "building" until stopped.
#[derive(Debug, Default)]
pub struct MemoryJobRunner {
    building: Mutex<HashMap<(String, u64), bool>>,
    stops: Mutex<Vec<(String, u64)>>,
    fail_queries: bool,
}

impl MemoryJobRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `build_info` call errors.
    pub fn failing() -> Self {
        Self {
            fail_queries: true,
            ..Self::default()
        }
    }

    /// Mark a build as running or finished.
    pub fn set_building(&self, job_name: &str, build_number: u64, building: bool) {
        let mut map = self.building.lock().unwrap();
        map.insert((job_name.to_string(), build_number), building);
    }

    /// Every stop request received, in order.
    pub fn stops(&self) -> Vec<(String, u64)> {
        self.stops.lock().unwrap().clone()
    }
}

#[async_trait]
impl JobRunner for MemoryJobRunner {
    async fn build_info(&self, job_name: &str, build_number: u64) -> ForgeResult<BuildInfo> {
        if self.fail_queries {
            return Err(ForgeError::Http("connection refused".to_string()));
        }
        let map = self.building.lock().unwrap();
        let building = map
            .get(&(job_name.to_string(), build_number))
            .copied()
            .unwrap_or(false);
        Ok(BuildInfo {
            number: build_number,
            building,
            result: if building {
                None
            } else {
                Some("SUCCESS".to_string())
            },
        })
    }

    async fn stop_build(&self, job_name: &str, build_number: u64) -> ForgeResult<()> {
        self.stops
            .lock()
            .unwrap()
            .push((job_name.to_string(), build_number));
        let mut map = self.building.lock().unwrap();
        map.insert((job_name.to_string(), build_number), false);
        Ok(())
    }
}
