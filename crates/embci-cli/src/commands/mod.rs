//! Built-in commands and the helpers they share.

pub mod build_platform;
pub mod ci;
pub mod clone_repo;
pub mod code_check;
pub mod comment;
pub mod cron;
pub mod gate;
pub mod pr_check;
pub mod pre;
pub mod test_platform;

use std::sync::Arc;

use anyhow::{Context, Result};
use base64::Engine;
use clap::{ArgMatches, Args, FromArgMatches};
use embci_core::config::{self, CommonConfig, COMMON_CONF};
use embci_core::{AppContext, CiCommand, CommandTable};
use embci_forge::{ForgeClient, GiteeClient, GiteeConfig, JenkinsClient, JenkinsConfig, JobRunner};
use serde::de::DeserializeOwned;
use tracing::debug;

pub use build_platform::BuildPlatform;
pub use ci::Ci;
pub use clone_repo::CloneRepo;
pub use code_check::CodeCheck;
pub use comment::Comment;
pub use cron::Cron;
pub use gate::Gate;
pub use pr_check::PrCheck;
pub use pre::Pre;
pub use test_platform::TestPlatform;

/// Constructors keyed by the `class` used in `plugins.yaml`.
pub fn table() -> CommandTable {
    let mut table = CommandTable::new();
    table.insert("Gate", || Box::new(Gate) as Box<dyn CiCommand>);
    table.insert("Cron", || Box::new(Cron) as Box<dyn CiCommand>);
    table.insert("CodeCheck", || Box::new(CodeCheck) as Box<dyn CiCommand>);
    table.insert("BuildPlatform", || Box::new(BuildPlatform) as Box<dyn CiCommand>);
    table.insert("TestPlatform", || Box::new(TestPlatform) as Box<dyn CiCommand>);
    table.insert("Comment", || Box::new(Comment) as Box<dyn CiCommand>);
    table.insert("PrCheck", || Box::new(PrCheck) as Box<dyn CiCommand>);
    table.insert("CloneRepo", || Box::new(CloneRepo) as Box<dyn CiCommand>);
    table.insert("Pre", || Box::new(Pre) as Box<dyn CiCommand>);
    table.insert("Ci", || Box::new(Ci) as Box<dyn CiCommand>);
    table
}

// ---------------------------------------------------------------------------
// Shared flags
// ---------------------------------------------------------------------------

/// Repository identity and forge credentials.
#[derive(Debug, Clone, Args)]
pub struct ForgeArgs {
    /// Repository namespace
    #[arg(short = 'o', long = "owner", default_value = "openeuler")]
    pub owner: String,

    /// Repository name
    #[arg(short = 'p', long = "repo")]
    pub repo: String,

    /// Forge access token
    #[arg(long = "gitee_token", env = "EMBCI_FORGE_TOKEN", hide_env_values = true)]
    pub gitee_token: Option<String>,
}

impl ForgeArgs {
    pub fn client(&self, common: &CommonConfig) -> Result<Arc<dyn ForgeClient>> {
        let mut config =
            GiteeConfig::new(&self.owner, &self.repo).with_api_url(&common.forge.api_url);
        if let Some(token) = self.gitee_token.as_deref().filter(|t| !t.is_empty()) {
            config = config.with_token(token);
        }
        let client = GiteeClient::new(config).context("Failed to create the forge client")?;
        Ok(Arc::new(client))
    }

    /// Clone URL on the public forge.
    pub fn remote_url(&self) -> String {
        format!("https://gitee.com/{}/{}.git", self.owner, self.repo)
    }
}

/// Job-runner location and credentials.
#[derive(Debug, Clone, Args)]
pub struct JobRunnerArgs {
    /// Job-runner root; defaults to `jenkins.base_url` of comm.yaml
    #[arg(long = "jenkins_url", env = "JENKINS_URL")]
    pub jenkins_url: Option<String>,

    #[arg(long = "jenkins_user", env = "EMBCI_JENKINS_USER")]
    pub jenkins_user: Option<String>,

    #[arg(long = "jenkins_pwd", env = "EMBCI_JENKINS_TOKEN", hide_env_values = true)]
    pub jenkins_pwd: Option<String>,
}

impl JobRunnerArgs {
    pub fn client(&self, common: &CommonConfig) -> Result<Arc<dyn JobRunner>> {
        let base = self
            .jenkins_url
            .as_deref()
            .unwrap_or(common.jenkins.base_url.as_str());
        let mut config = JenkinsConfig::new(base);
        if let (Some(user), Some(pwd)) = (&self.jenkins_user, &self.jenkins_pwd) {
            config = config.with_credentials(user, pwd);
        }
        let client = JenkinsClient::new(config).context("Failed to create the job-runner client")?;
        Ok(Arc::new(client))
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Typed view of a command's parsed flags.
pub(crate) fn parse_args<A: FromArgMatches>(matches: &ArgMatches) -> Result<A> {
    A::from_arg_matches(matches).map_err(anyhow::Error::new)
}

/// Read `name` from the conf directory, or defaults when it is absent.
pub(crate) fn load_or_default<T: DeserializeOwned + Default>(
    ctx: &AppContext,
    name: &str,
) -> Result<T> {
    let path = ctx.paths.conf_file(name);
    if !path.is_file() {
        debug!(path = %path.display(), "no config file, using defaults");
        return Ok(T::default());
    }
    config::load_yaml(&path).with_context(|| format!("Failed to read {}", path.display()))
}

pub(crate) fn common_config(ctx: &AppContext) -> Result<CommonConfig> {
    load_or_default(ctx, COMMON_CONF)
}

/// Decode a standard base64 value into UTF-8 text.
pub fn decode_base64(value: &str) -> Result<String> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(value.trim())
        .with_context(|| format!("Invalid base64 value {:?}", value))?;
    String::from_utf8(bytes).context("Decoded base64 value is not UTF-8")
}

/// Split a `;`-separated list, trimming items and dropping empty ones.
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_list() {
        assert_eq!(split_list(" a; b ;;c;"), vec!["a", "b", "c"]);
        assert!(split_list("").is_empty());
    }

    #[test]
    fn test_decode_base64() {
        assert_eq!(decode_base64("b3BlbmV1bGVyLWltYWdl\n").unwrap(), "openeuler-image");
        assert!(decode_base64("not base64!").is_err());
    }

    #[test]
    fn test_every_class_constructs_its_command() {
        let table = table();
        assert_eq!(table.len(), 10);
        for (class, ctor) in &table {
            let command = ctor();
            assert!(
                embci_core::command::command_parser(command.as_ref()).is_ok(),
                "{class} declares a foreign parser"
            );
        }
    }
}
