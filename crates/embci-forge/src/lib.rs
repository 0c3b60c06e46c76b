//! embci-forge: Git forge and CI job-runner clients
//!
//! The gate talks to two external systems: the Git forge hosting the pull
//! request (Gitee) and the job runner executing the gate (Jenkins). Both are
//! reached through traits so the orchestrator can be driven by in-memory
//! fakes in tests.

pub mod error;
pub mod fakes;
pub mod gitee;
pub mod jenkins;
pub mod traits;

pub use error::{ForgeError, ForgeResult};
pub use gitee::{GiteeClient, GiteeConfig};
pub use jenkins::{JenkinsClient, JenkinsConfig};
pub use traits::{BuildInfo, FilePatch, ForgeClient, JobRunner, PrCommit, PrFile};
