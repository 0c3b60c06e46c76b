//! Error types for embci-forge

use thiserror::Error;

/// Errors produced by the forge and job-runner clients
#[derive(Error, Debug)]
pub enum ForgeError {
    /// Transport-level failure (DNS, TLS, timeout)
    #[error("HTTP error: {0}")]
    Http(String),

    /// The remote answered with a status outside 200/201/204
    #[error("unexpected status {status} from {url}: {body}")]
    Status {
        status: u16,
        url: String,
        body: String,
    },

    /// Response body could not be decoded
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    /// Client was built without a required setting
    #[error("client is not configured: {0}")]
    NotConfigured(String),
}

impl From<reqwest::Error> for ForgeError {
    fn from(err: reqwest::Error) -> Self {
        ForgeError::Http(err.to_string())
    }
}

/// Result type for forge operations
pub type ForgeResult<T> = std::result::Result<T, ForgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_error_mentions_code_and_url() {
        let err = ForgeError::Status {
            status: 404,
            url: "https://gitee.com/api/v5/repos/o/r/pulls/1/files".to_string(),
            body: "not found".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("404"));
        assert!(msg.contains("/pulls/1/files"));
    }
}
