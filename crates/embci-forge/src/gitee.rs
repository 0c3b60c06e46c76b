//! Gitee REST client
//!
//! Thin wrapper over the `api/v5` pull-request endpoints. The access token
//! travels as the `access_token` parameter the way Gitee expects it.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{ForgeError, ForgeResult};
use crate::traits::{ForgeClient, PrCommit, PrFile};

/// Public Gitee API root.
pub const DEFAULT_API_URL: &str = "https://gitee.com/api/v5/repos";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Gitee connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GiteeConfig {
    /// Repository namespace
    pub owner: String,
    /// Repository name
    pub repo: String,
    /// Personal access token, required for writes
    pub token: Option<String>,
    /// API root, overridable for tests and mirrors
    pub api_url: String,
}

impl GiteeConfig {
    /// Config for `owner/repo` on the public instance
    pub fn new(owner: &str, repo: &str) -> Self {
        GiteeConfig {
            owner: owner.to_string(),
            repo: repo.to_string(),
            token: None,
            api_url: DEFAULT_API_URL.to_string(),
        }
    }

    /// Set the access token
    pub fn with_token(mut self, token: &str) -> Self {
        self.token = Some(token.to_string());
        self
    }

    /// Point the client at another API root
    pub fn with_api_url(mut self, api_url: &str) -> Self {
        self.api_url = api_url.trim_end_matches('/').to_string();
        self
    }
}

/// Gitee pull-request client
pub struct GiteeClient {
    config: GiteeConfig,
    http_client: reqwest::Client,
}

impl GiteeClient {
    /// Create a new client
    pub fn new(config: GiteeConfig) -> ForgeResult<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("embci/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(GiteeClient {
            config,
            http_client,
        })
    }

    pub fn config(&self) -> &GiteeConfig {
        &self.config
    }

    fn repo_url(&self, tail: &str) -> String {
        format!(
            "{}/{}/{}/{}",
            self.config.api_url, self.config.owner, self.config.repo, tail
        )
    }

    fn is_ok_status(status: StatusCode) -> bool {
        matches!(
            status,
            StatusCode::OK | StatusCode::CREATED | StatusCode::NO_CONTENT
        )
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: String) -> ForgeResult<T> {
        debug!(url = %url, "GET");
        let resp = self.http_client.get(&url).send().await?;
        let status = resp.status();
        let body = resp.text().await?;
        if !Self::is_ok_status(status) {
            return Err(ForgeError::Status {
                status: status.as_u16(),
                url,
                body,
            });
        }
        Ok(serde_json::from_str(&body)?)
    }

    /// Send a write request. Failures are logged and collapse to `false`.
    async fn write(&self, request: reqwest::RequestBuilder, what: &str) -> bool {
        match request.send().await {
            Ok(resp) => {
                let status = resp.status();
                if Self::is_ok_status(status) {
                    return true;
                }
                let body = resp.text().await.unwrap_or_default();
                warn!(status = status.as_u16(), body = %body, "{} rejected", what);
                false
            }
            Err(e) => {
                warn!(error = %e, "{} failed", what);
                false
            }
        }
    }

    fn token(&self) -> &str {
        self.config.token.as_deref().unwrap_or_default()
    }
}

#[async_trait]
impl ForgeClient for GiteeClient {
    fn owner(&self) -> &str {
        &self.config.owner
    }

    fn repo(&self) -> &str {
        &self.config.repo
    }

    async fn pr_commits(&self, pr_num: u64) -> ForgeResult<Vec<PrCommit>> {
        self.get_json(self.repo_url(&format!("pulls/{}/commits", pr_num)))
            .await
    }

    async fn pr_files(&self, pr_num: u64) -> ForgeResult<Vec<PrFile>> {
        self.get_json(self.repo_url(&format!("pulls/{}/files", pr_num)))
            .await
    }

    async fn commit_info(&self, sha: &str) -> ForgeResult<serde_json::Value> {
        self.get_json(self.repo_url(&format!("commits/{}", sha)))
            .await
    }

    async fn comment_pr(&self, pr_num: u64, body: &str) -> bool {
        let url = self.repo_url(&format!("pulls/{}/comments", pr_num));
        let request = self
            .http_client
            .post(url)
            .form(&[("access_token", self.token()), ("body", body)]);
        self.write(request, "comment").await
    }

    async fn add_labels(&self, pr_num: u64, labels: &[&str]) -> bool {
        let url = self.repo_url(&format!("pulls/{}/labels", pr_num));
        let request = self
            .http_client
            .post(url)
            .query(&[("access_token", self.token())])
            .json(&labels);
        self.write(request, "add labels").await
    }

    async fn remove_labels(&self, pr_num: u64, labels: &[&str]) -> bool {
        let url = self.repo_url(&format!("pulls/{}/labels/{}", pr_num, labels.join(",")));
        let request = self
            .http_client
            .request(Method::DELETE, url)
            .query(&[("access_token", self.token())]);
        self.write(request, "remove labels").await
    }

    async fn create_issue(&self, title: &str, body: &str) -> bool {
        let url = format!("{}/{}/issues", self.config.api_url, self.config.owner);
        let request = self.http_client.post(url).form(&[
            ("access_token", self.token()),
            ("repo", self.config.repo.as_str()),
            ("title", title),
            ("body", body),
        ]);
        self.write(request, "create issue").await
    }
}
