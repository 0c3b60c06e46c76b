//! Error taxonomy for embci-core.
//!
//! `ConfigError` is fatal: it aborts startup or the resolution of one
//! command. The three capability errors let a build, check or test task
//! report a clean failure distinct from infrastructure trouble.

use std::path::PathBuf;

/// Startup and resolution errors. Never retried.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("malformed plugin list: {0}")]
    PluginList(String),

    #[error("plugin {name}: no implementation registered for class {class}")]
    UnknownImplementation { name: String, class: String },

    #[error("no symbol {symbol} in extension {path}")]
    ExtensionNotFound { path: String, symbol: String },

    #[error("extension {path}::{symbol} is a {found} task, expected {expected}")]
    CapabilityMismatch {
        path: String,
        symbol: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("command {0} did not return a usable sub-parser")]
    FlagRegistration(String),

    #[error("missing environment variable {0}")]
    MissingEnv(String),

    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("cannot read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Failure of a build task.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("`{command}` failed ({code:?}): {output}")]
    Subprocess {
        command: String,
        code: Option<i32>,
        output: String,
    },

    #[error("build input missing: {0}")]
    MissingInput(String),

    #[error("build failed: {0}")]
    Failed(String),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure of a check task.
#[derive(Debug, thiserror::Error)]
pub enum CheckError {
    #[error("`{command}` could not run: {reason}")]
    Subprocess { command: String, reason: String },

    #[error("forge error: {0}")]
    Forge(#[from] embci_forge::ForgeError),

    #[error("check failed: {0}")]
    Failed(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure of a test task.
#[derive(Debug, thiserror::Error)]
pub enum TestError {
    #[error("test asset missing: {0}")]
    MissingAsset(String),

    #[error("unsupported target: {0}")]
    Unsupported(String),

    #[error("test failed: {0}")]
    Failed(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
