//! Error types for embci-gate

use std::path::PathBuf;

use thiserror::Error;

/// Infrastructure failures of the gate orchestrator
#[derive(Error, Debug)]
pub enum GateError {
    #[error("io error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot lock run record {}: {source}", .path.display())]
    Lock {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("malformed run record: {0}")]
    Record(#[from] serde_yaml::Error),

    #[error("`{command}` failed: {output}")]
    Command { command: String, output: String },

    #[error("subprocess error: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("forge error: {0}")]
    Forge(#[from] embci_forge::ForgeError),

    #[error("config error: {0}")]
    Config(#[from] embci_core::ConfigError),

    #[error("background task failed: {0}")]
    Join(String),
}

impl GateError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        GateError::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<tokio::task::JoinError> for GateError {
    fn from(err: tokio::task::JoinError) -> Self {
        GateError::Join(err.to_string())
    }
}

/// Result type for gate operations
pub type GateResult<T> = std::result::Result<T, GateError>;
