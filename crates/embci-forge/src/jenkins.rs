//! Jenkins job-runner client
//!
//! Only the two calls the preemption step needs: describe a build and ask
//! it to stop.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{ForgeError, ForgeResult};
use crate::traits::{BuildInfo, JobRunner};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Jenkins connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JenkinsConfig {
    /// Server root, e.g. `https://ci.example.org/`
    pub base_url: String,
    pub user: Option<String>,
    /// API token for `user`
    pub token: Option<String>,
}

impl JenkinsConfig {
    pub fn new(base_url: &str) -> Self {
        JenkinsConfig {
            base_url: base_url.trim_end_matches('/').to_string(),
            user: None,
            token: None,
        }
    }

    /// Set basic-auth credentials
    pub fn with_credentials(mut self, user: &str, token: &str) -> Self {
        self.user = Some(user.to_string());
        self.token = Some(token.to_string());
        self
    }
}

/// Jenkins REST client
pub struct JenkinsClient {
    config: JenkinsConfig,
    http_client: reqwest::Client,
}

impl JenkinsClient {
    pub fn new(config: JenkinsConfig) -> ForgeResult<Self> {
        if config.base_url.is_empty() {
            return Err(ForgeError::NotConfigured("jenkins base_url".to_string()));
        }
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("embci/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(JenkinsClient {
            config,
            http_client,
        })
    }

    /// `folder/job` becomes `job/folder/job/job`, the way Jenkins nests folders.
    pub fn job_path(job_name: &str) -> String {
        job_name
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| format!("job/{}", s))
            .collect::<Vec<_>>()
            .join("/")
    }

    fn build_url(&self, job_name: &str, build_number: u64, tail: &str) -> String {
        format!(
            "{}/{}/{}/{}",
            self.config.base_url,
            Self::job_path(job_name),
            build_number,
            tail
        )
    }

    fn authed(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.user {
            Some(user) => request.basic_auth(user, self.config.token.as_deref()),
            None => request,
        }
    }
}

#[async_trait]
impl JobRunner for JenkinsClient {
    async fn build_info(&self, job_name: &str, build_number: u64) -> ForgeResult<BuildInfo> {
        let url = self.build_url(job_name, build_number, "api/json");
        debug!(url = %url, "querying build");
        let resp = self.authed(self.http_client.get(&url)).send().await?;
        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(ForgeError::Status {
                status: status.as_u16(),
                url,
                body,
            });
        }
        Ok(serde_json::from_str(&body)?)
    }

    async fn stop_build(&self, job_name: &str, build_number: u64) -> ForgeResult<()> {
        let url = self.build_url(job_name, build_number, "stop");
        info!(job = %job_name, build = build_number, "requesting stop");
        let resp = self.authed(self.http_client.post(&url)).send().await?;
        let status = resp.status();
        // Jenkins answers a stop with a redirect to the build page.
        if status.is_success() || status.is_redirection() {
            return Ok(());
        }
        Err(ForgeError::Status {
            status: status.as_u16(),
            url,
            body: resp.text().await.unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_path_nests_folders() {
        assert_eq!(JenkinsClient::job_path("gate"), "job/gate");
        assert_eq!(
            JenkinsClient::job_path("openeuler/embedded/gate"),
            "job/openeuler/job/embedded/job/gate"
        );
    }

    #[test]
    fn test_build_url() {
        let client = JenkinsClient::new(JenkinsConfig::new("https://ci.example.org/")).unwrap();
        assert_eq!(
            client.build_url("a/b", 42, "api/json"),
            "https://ci.example.org/job/a/job/b/42/api/json"
        );
    }

    #[test]
    fn test_empty_base_url_is_rejected() {
        let err = JenkinsClient::new(JenkinsConfig::new("")).err().unwrap();
        assert!(matches!(err, ForgeError::NotConfigured(_)));
    }
}
