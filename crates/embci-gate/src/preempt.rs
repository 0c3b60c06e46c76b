//! Supersede the previous in-flight gate run of a pull request.
//!
//! Each PR has a small YAML record `{job_name, build_num}` under the shared
//! directory naming the run that currently owns it. A new run takes an
//! exclusive `flock` on the record, stops the previous build if the job
//! runner still reports it as building, writes its own identity and
//! releases the lock. Cancellation is advisory: the stop request is not
//! awaited, the old run simply no longer matches the record.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use embci_core::config::RunContext;
use embci_core::report::PREEMPT_COMMENT;
use embci_forge::{ForgeClient, JobRunner};
use fs2::FileExt;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{info, warn};

use crate::error::{GateError, GateResult};

/// Identity of the run that owns a PR.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    pub job_name: String,
    #[serde(deserialize_with = "number_or_string")]
    pub build_num: u64,
}

impl RunRecord {
    pub fn from_run(run: &RunContext) -> Self {
        Self {
            job_name: run.job_name.clone(),
            build_num: run.build_number,
        }
    }
}

fn number_or_string<'de, D: Deserializer<'de>>(de: D) -> Result<u64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(u64),
        Text(String),
    }
    match Raw::deserialize(de)? {
        Raw::Num(n) => Ok(n),
        Raw::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// Location of a PR's run record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunLockKey {
    pub share_dir: PathBuf,
    pub repo: String,
    pub owner: String,
    pub pr_num: u64,
}

impl RunLockKey {
    pub fn new(share_dir: impl Into<PathBuf>, repo: &str, owner: &str, pr_num: u64) -> Self {
        Self {
            share_dir: share_dir.into(),
            repo: repo.to_string(),
            owner: owner.to_string(),
            pr_num,
        }
    }

    /// `<share_dir>/<repo>/<owner>/pr_num/<pr>`
    pub fn path(&self) -> PathBuf {
        self.share_dir
            .join(&self.repo)
            .join(&self.owner)
            .join("pr_num")
            .join(self.pr_num.to_string())
    }
}

/// What the preempt step found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreemptOutcome {
    /// No earlier record.
    Fresh,
    /// The record already named this run.
    SameRun,
    /// The earlier build had finished.
    PreviousFinished(RunRecord),
    /// The earlier build was still running and a stop was requested.
    PreviousCancelled(RunRecord),
    /// The job runner could not say; the record was taken over anyway.
    PreviousUnknown(RunRecord),
}

/// Exclusive lock over one record file, released on drop.
struct LockedRecord {
    file: File,
    path: PathBuf,
}

impl LockedRecord {
    async fn acquire(path: PathBuf) -> GateResult<Self> {
        tokio::task::spawn_blocking(move || {
            if let Some(dir) = path.parent() {
                std::fs::create_dir_all(dir).map_err(|e| GateError::io(dir, e))?;
            }
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(&path)
                .map_err(|e| GateError::io(&path, e))?;
            file.lock_exclusive().map_err(|source| GateError::Lock {
                path: path.clone(),
                source,
            })?;
            Ok(LockedRecord { file, path })
        })
        .await?
    }

    fn read(&mut self) -> GateResult<Option<RunRecord>> {
        let mut raw = String::new();
        self.file
            .seek(SeekFrom::Start(0))
            .and_then(|_| self.file.read_to_string(&mut raw))
            .map_err(|e| GateError::io(&self.path, e))?;
        if raw.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_yaml::from_str(&raw)?))
    }

    fn write(&mut self, record: &RunRecord) -> GateResult<()> {
        let body = serde_yaml::to_string(record)?;
        let path = self.path.clone();
        self.file
            .set_len(0)
            .and_then(|_| self.file.seek(SeekFrom::Start(0)))
            .and_then(|_| self.file.write_all(body.as_bytes()))
            .and_then(|_| self.file.sync_data())
            .map_err(|e| GateError::io(path, e))
    }
}

impl Drop for LockedRecord {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

/// Read the current owner of a PR without taking it over.
pub fn read_record(path: &Path) -> GateResult<Option<RunRecord>> {
    match std::fs::read_to_string(path) {
        Ok(raw) if raw.trim().is_empty() => Ok(None),
        Ok(raw) => Ok(Some(serde_yaml::from_str(&raw)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(GateError::io(path, e)),
    }
}

/// Take over the PR for `run`, stopping the previous build if it is still
/// active. Job-runner failures are logged and ignored.
pub async fn preempt(
    key: &RunLockKey,
    run: &RunContext,
    forge: &dyn ForgeClient,
    jobs: &dyn JobRunner,
) -> GateResult<PreemptOutcome> {
    let mut locked = LockedRecord::acquire(key.path()).await?;
    let me = RunRecord::from_run(run);

    let previous = match locked.read() {
        Ok(p) => p,
        Err(GateError::Record(e)) => {
            warn!(pr = key.pr_num, error = %e, "run record unreadable, overwriting");
            None
        }
        Err(e) => return Err(e),
    };

    let outcome = match previous {
        None => PreemptOutcome::Fresh,
        Some(prev) if prev == me => PreemptOutcome::SameRun,
        Some(prev) => match jobs.build_info(&prev.job_name, prev.build_num).await {
            Ok(info) if info.building => {
                info!(
                    pr = key.pr_num,
                    job = %prev.job_name,
                    build = prev.build_num,
                    "stopping superseded build"
                );
                forge.comment_pr(key.pr_num, PREEMPT_COMMENT).await;
                if let Err(e) = jobs.stop_build(&prev.job_name, prev.build_num).await {
                    warn!(error = %e, "stop request failed");
                }
                PreemptOutcome::PreviousCancelled(prev)
            }
            Ok(_) => PreemptOutcome::PreviousFinished(prev),
            Err(e) => {
                warn!(error = %e, job = %prev.job_name, "build info unavailable");
                PreemptOutcome::PreviousUnknown(prev)
            }
        },
    };

    locked.write(&me)?;
    Ok(outcome)
}
